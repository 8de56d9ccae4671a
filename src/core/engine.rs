use crate::core::resolver::ParcelResolver;
use crate::domain::model::{Coordinate, ExistenceResult, ResolutionResult};
use crate::domain::ports::{Notifier, Transport};
use crate::utils::error::{VerificationError, WorkflowError};
use tracing::instrument;

/// Runs the two request workflows: resolve then notify, and verify.
pub struct PartidaEngine<T: Transport, N: Notifier> {
    resolver: ParcelResolver<T>,
    notifier: N,
}

impl<T: Transport, N: Notifier> PartidaEngine<T, N> {
    pub fn new(resolver: ParcelResolver<T>, notifier: N) -> Self {
        Self { resolver, notifier }
    }

    pub fn resolver(&self) -> &ParcelResolver<T> {
        &self.resolver
    }

    /// The resolved partida is returned even when the caller only needs the
    /// email; a failed send keeps it inside [`WorkflowError::Notification`].
    #[instrument(skip(self, recipient))]
    pub async fn resolve_and_notify(
        &self,
        coord: Coordinate,
        recipient: &str,
    ) -> Result<ResolutionResult, WorkflowError> {
        tracing::info!("Resolving partida for {}", coord);
        let resolved = self.resolver.resolve_parcel(coord).await?;

        match self.notifier.notify(recipient, &resolved).await {
            Ok(receipt) => {
                tracing::info!(
                    "Notified {} identifier(s) at {}",
                    resolved.identifiers().len(),
                    receipt.sent_at
                );
                Ok(resolved)
            }
            Err(source) => {
                tracing::error!("Resolved {:?} but notification failed: {}", resolved, source);
                Err(WorkflowError::Notification { resolved, source })
            }
        }
    }

    pub async fn verify(&self, coord: Coordinate) -> Result<ExistenceResult, VerificationError> {
        self.resolver.verify_existence(coord).await
    }
}
