use crate::client::MessagingClient;
use crate::context::consumer_span;
use crate::error::{ClientError, ForwardError, RelayError};
use crate::forwarder::Forwarder;
use crate::interrupt::Interrupt;
use crate::model::Message;
use crate::object::Destination;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, trace, warn};

/// Executes one tick: connect, drain the destination, forward, disconnect.
pub struct ConsumerProcessor<C, F> {
    destination: Destination,
    receive_timeout: Duration,
    client: Arc<Mutex<C>>,
    forwarder: Arc<F>,
    consumed: Arc<AtomicU64>,
}

impl<C, F> ConsumerProcessor<C, F>
where
    C: MessagingClient + 'static,
    F: Forwarder + 'static,
{
    pub fn new(
        destination: Destination,
        receive_timeout: Duration,
        client: Arc<Mutex<C>>,
        forwarder: Arc<F>,
        consumed: Arc<AtomicU64>,
    ) -> Self {
        Self {
            destination,
            receive_timeout,
            client,
            forwarder,
            consumed,
        }
    }

    /// Runs a single tick and returns how many messages were forwarded.
    ///
    /// Never fails: a failed connect ends the tick early, an interrupted receive
    /// ends it quietly, and any other client or forwarding error is logged
    /// before the connection is stopped. The next tick starts from scratch.
    pub async fn run(&self, interrupt: &Interrupt) -> u64 {
        self.run_tick(interrupt)
            .instrument(consumer_span(&self.destination))
            .await
    }

    async fn run_tick(&self, interrupt: &Interrupt) -> u64 {
        debug!(
            "Entering message processing loop for consumer {}",
            self.destination
        );
        if interrupt.is_interrupted() {
            return 0;
        }

        let mut client = self.client.lock().await;
        if let Err(e) = client.connect().await {
            warn!("Failed to connect consumer for {}: {}", self.destination, e);
            return 0;
        }

        let mut forwarded = 0;
        if let Err(e) = self.consume(&mut *client, interrupt, &mut forwarded).await {
            warn!(
                "Error encountered in processing loop for {} - stopping consumer: {}",
                self.destination, e
            );
        }

        info!("Consumer for {} stopped", self.destination);
        client.stop_connection().await;
        forwarded
    }

    async fn consume(
        &self,
        client: &mut C,
        interrupt: &Interrupt,
        forwarded: &mut u64,
    ) -> Result<(), RelayError> {
        client.create_consumer(&self.destination).await?;
        client.start_connection().await?;

        while client.is_connection_started() && !interrupt.is_interrupted() {
            match client.receive(self.receive_timeout, interrupt).await {
                Ok(Some(message)) => {
                    self.forward(message).await?;
                    *forwarded += 1;
                }
                Ok(None) => trace!(
                    "No message from {} within {:?}",
                    self.destination, self.receive_timeout
                ),
                Err(ClientError::Interrupted) => {
                    if let Err(e) = client.cleanup().await {
                        debug!("Cleanup after interrupt failed for {}: {}", self.destination, e);
                    }
                    debug!(
                        "receive({:?}) interrupted in processing loop for {} - stopping consumer",
                        self.receive_timeout, self.destination
                    );
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn forward(&self, message: Message) -> Result<(), ForwardError> {
        let id = message.id.clone();
        self.forwarder.forward(message).await.inspect_err(|e| {
            warn!("Failed to forward message {} from {}: {}", id, self.destination, e);
        })?;
        self.consumed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
