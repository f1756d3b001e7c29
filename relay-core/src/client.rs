use crate::error::ClientError;
use crate::interrupt::Interrupt;
use crate::model::Message;
use crate::object::Destination;
use async_trait::async_trait;
use std::time::Duration;

/// Connection and consumer handle for one broker destination.
///
/// The consumer task owns its client exclusively and drives it through
/// `connect → create_consumer → start_connection → receive* → stop_connection`
/// once per tick.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagingClient: Send {
    /// Opens the broker connection if one is not already open.
    async fn connect(&mut self) -> Result<(), ClientError>;

    async fn create_consumer(&mut self, destination: &Destination) -> Result<(), ClientError>;

    async fn start_connection(&mut self) -> Result<(), ClientError>;

    fn is_connection_started(&self) -> bool;

    async fn stop_connection(&mut self);

    /// Releases the consumer after an interrupted receive without tearing down
    /// anything owned by the scheduler.
    async fn cleanup(&mut self) -> Result<(), ClientError>;

    /// Waits up to `timeout` for the next message.
    ///
    /// # Errors
    /// Returns [`ClientError::Interrupted`] when `interrupt` fires while waiting.
    async fn receive(
        &mut self,
        timeout: Duration,
        interrupt: &Interrupt,
    ) -> Result<Option<Message>, ClientError>;
}
