// Adapters: concrete transports and the email notifier behind the domain ports.

#[cfg(feature = "browser")]
pub mod browser;
pub mod email;
pub mod http;
pub mod retry;

use crate::config::{TransportConfig, TransportKind};
use crate::domain::ports::Transport;
use crate::utils::error::{AppError, Result};
use std::sync::Arc;

#[cfg(feature = "browser")]
pub use browser::BrowserPool;

/// Stand-in so callers can name the pool type without the `browser` feature.
#[cfg(not(feature = "browser"))]
#[derive(Debug, Default)]
pub struct BrowserPool;

#[cfg(not(feature = "browser"))]
impl BrowserPool {
    pub async fn shutdown(&self) {}
}

/// Builds the transport named by `config.kind`. The browser variant needs
/// the shared pool; the HTTP variant ignores it.
pub fn build_transport(
    config: &TransportConfig,
    pool: Option<Arc<BrowserPool>>,
) -> Result<Arc<dyn Transport>> {
    match config.kind {
        TransportKind::Http => {
            tracing::info!("Using direct HTTP transport");
            Ok(Arc::new(http::HttpTransport::new(config)?))
        }
        #[cfg(feature = "browser")]
        TransportKind::Browser => {
            let pool = pool.ok_or_else(|| AppError::ConfigError {
                message: "browser transport requires a browser pool".to_string(),
            })?;
            tracing::info!("Using rendered-page transport");
            Ok(Arc::new(browser::RenderedPageTransport::new(pool, config)?))
        }
        #[cfg(not(feature = "browser"))]
        TransportKind::Browser => {
            let _ = pool;
            Err(AppError::InvalidConfigValueError {
                field: "transport.kind".to_string(),
                value: "browser".to_string(),
                reason: "this build was compiled without the 'browser' feature".to_string(),
            })
        }
    }
}

/// Pool to hand to [`build_transport`] for the configured kind.
pub fn browser_pool_for(config: &TransportConfig) -> Option<Arc<BrowserPool>> {
    match config.kind {
        TransportKind::Http => None,
        #[cfg(feature = "browser")]
        TransportKind::Browser => Some(Arc::new(BrowserPool::new(
            config.browser.clone(),
            config.attempt_timeout(),
        ))),
        #[cfg(not(feature = "browser"))]
        TransportKind::Browser => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_is_default() {
        let config = TransportConfig::default();
        assert!(browser_pool_for(&config).is_none());
        let transport = build_transport(&config, None).unwrap();
        assert_eq!(transport.name(), "http");
    }

    #[cfg(not(feature = "browser"))]
    #[test]
    fn test_browser_kind_needs_feature() {
        let config = TransportConfig {
            kind: TransportKind::Browser,
            ..TransportConfig::default()
        };
        assert!(build_transport(&config, None).is_err());
    }

    #[cfg(feature = "browser")]
    #[test]
    fn test_browser_kind_needs_pool() {
        let config = TransportConfig {
            kind: TransportKind::Browser,
            ..TransportConfig::default()
        };
        assert!(build_transport(&config, None).is_err());
        let pool = browser_pool_for(&config);
        assert_eq!(build_transport(&config, pool).unwrap().name(), "browser");
    }
}
