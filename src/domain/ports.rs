use crate::domain::model::{FetchRequest, NotificationReceipt, RawResponse, ResolutionResult};
use crate::utils::error::{NotificationError, TransportError};
use async_trait::async_trait;
use std::sync::Arc;

/// Resilient fetch. Implementations own retry, backoff and per-attempt
/// timeouts; 4xx answers come back as `Ok` because they carry meaning.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<RawResponse, TransportError>;

    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn fetch(&self, request: &FetchRequest) -> Result<RawResponse, TransportError> {
        (**self).fetch(request).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient: &str,
        result: &ResolutionResult,
    ) -> Result<NotificationReceipt, NotificationError>;
}

#[async_trait]
impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    async fn notify(
        &self,
        recipient: &str,
        result: &ResolutionResult,
    ) -> Result<NotificationReceipt, NotificationError> {
        (**self).notify(recipient, result).await
    }
}
