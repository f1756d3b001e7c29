use crate::error::ForwardError;
use crate::model::Message;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Delivers a received message to the event-ingestion endpoint.
    async fn forward(&self, message: Message) -> Result<(), ForwardError>;
}
