pub mod routes;
pub mod server;

use crate::adapters::email::BrevoNotifier;
use crate::adapters::{browser_pool_for, build_transport, BrowserPool};
use crate::config::AppConfig;
use crate::core::{ParcelResolver, PartidaEngine};
use crate::domain::ports::{Notifier, Transport};
use crate::utils::error::Result;
use std::sync::Arc;

/// Engine with the transport and notifier chosen at runtime.
pub type DynEngine = PartidaEngine<Arc<dyn Transport>, Arc<dyn Notifier>>;

/// Wires the configured transport, the Brevo notifier and the resolver.
/// The returned pool (browser transport only) must be shut down on exit.
pub fn build_engine(config: &AppConfig) -> Result<(DynEngine, Option<Arc<BrowserPool>>)> {
    let pool = browser_pool_for(&config.transport);
    let transport = build_transport(&config.transport, pool.clone())?;

    let notifier = BrevoNotifier::new(config.email.clone())?;
    if !notifier.has_credentials() {
        tracing::warn!("BREVO_API_KEY is not set; email notifications will fail");
    }

    let resolver = ParcelResolver::from_config(transport, config)?;
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);
    Ok((PartidaEngine::new(resolver, notifier), pool))
}
