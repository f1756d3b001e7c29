pub mod config;

use crate::config::RedisClientConfig;
use async_trait::async_trait;
use futures::StreamExt;
use redis::RedisResult;
use redis::aio::{MultiplexedConnection, PubSub};
use relay_core::prelude::{ClientError, Destination, DestinationKind, Interrupt, Message, MessagingClient};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error};

enum Subscription {
    Queue { key: String },
    Topic { channel: String, pubsub: PubSub },
}

/// [`MessagingClient`] backed by Redis: queues are lists drained with `BLPOP`,
/// topics are pub-sub channels.
pub struct RedisMessagingClient {
    client: redis::Client,
    config: RedisClientConfig,
    connection: Option<MultiplexedConnection>,
    destination: Option<Destination>,
    subscription: Option<Subscription>,
    started: bool,
}

impl RedisMessagingClient {
    /// Creates a client for the given Redis URL. No connection is made yet.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connection`] if `connection_info` is not a valid Redis URL.
    pub fn new(connection_info: &str, config: RedisClientConfig) -> Result<Self, ClientError> {
        let client = redis::Client::open(connection_info)
            .map_err(|e| ClientError::Connection(format!("Invalid Redis URL: {e}")))?;
        Ok(Self {
            client,
            config,
            connection: None,
            destination: None,
            subscription: None,
            started: false,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

#[async_trait]
impl MessagingClient for RedisMessagingClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        if self.connection.is_some() {
            return Ok(());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!("Redis connection failed: {:?}", e);
                ClientError::Connection(e.to_string())
            })?;
        self.connection = Some(conn);
        Ok(())
    }

    async fn create_consumer(&mut self, destination: &Destination) -> Result<(), ClientError> {
        if self.connection.is_none() {
            return Err(ClientError::NotConnected);
        }
        let subscription = match destination.kind {
            DestinationKind::Queue => Subscription::Queue {
                key: self.config.list_key(&destination.name),
            },
            DestinationKind::Topic => {
                let channel = self.config.channel(&destination.name);
                let mut pubsub = self.client.get_async_pubsub().await.map_err(|e| {
                    error!("Redis pub-sub connection failed: {:?}", e);
                    ClientError::Connection(e.to_string())
                })?;
                pubsub.subscribe(&channel).await.map_err(broker_error)?;
                Subscription::Topic { channel, pubsub }
            }
        };
        self.destination = Some(destination.clone());
        self.subscription = Some(subscription);
        Ok(())
    }

    async fn start_connection(&mut self) -> Result<(), ClientError> {
        if self.subscription.is_none() {
            return Err(ClientError::NotConnected);
        }
        self.started = true;
        Ok(())
    }

    fn is_connection_started(&self) -> bool {
        self.started
    }

    async fn stop_connection(&mut self) {
        self.started = false;
        self.release_subscription().await;
        self.destination = None;
        self.connection = None;
    }

    async fn cleanup(&mut self) -> Result<(), ClientError> {
        self.started = false;
        self.release_subscription().await;
        Ok(())
    }

    async fn receive(
        &mut self,
        timeout: Duration,
        interrupt: &Interrupt,
    ) -> Result<Option<Message>, ClientError> {
        let Some(destination) = self.destination.as_ref() else {
            return Err(ClientError::NotConnected);
        };
        match self.subscription.as_mut() {
            Some(Subscription::Queue { key }) => {
                let conn = self.connection.as_mut().ok_or(ClientError::NotConnected)?;
                let popped = tokio::select! {
                    biased;
                    () = interrupt.interrupted() => return Err(ClientError::Interrupted),
                    popped = blpop(conn, key, timeout) => popped.map_err(broker_error)?,
                };
                Ok(popped.map(|(list, body)| {
                    Message::new(destination.clone(), body)
                        .with_property("redis.key", list)
                        .with_timestamp(OffsetDateTime::now_utc())
                }))
            }
            Some(Subscription::Topic { channel, pubsub }) => {
                let mut messages = std::pin::pin!(pubsub.on_message());
                let next = tokio::select! {
                    biased;
                    () = interrupt.interrupted() => return Err(ClientError::Interrupted),
                    next = tokio::time::timeout(timeout, messages.next()) => next,
                };
                match next {
                    Err(_elapsed) => Ok(None),
                    Ok(None) => Err(ClientError::Broker(format!(
                        "Subscription to {channel} was closed"
                    ))),
                    Ok(Some(msg)) => Ok(Some(
                        Message::new(destination.clone(), msg.get_payload_bytes())
                            .with_property("redis.channel", msg.get_channel_name())
                            .with_timestamp(OffsetDateTime::now_utc()),
                    )),
                }
            }
            None => Err(ClientError::NotConnected),
        }
    }
}

impl RedisMessagingClient {
    async fn release_subscription(&mut self) {
        if let Some(Subscription::Topic { channel, mut pubsub }) = self.subscription.take()
            && let Err(e) = pubsub.unsubscribe(&channel).await
        {
            debug!("Unsubscribe from {} failed: {}", channel, e);
        }
    }
}

async fn blpop(
    conn: &mut MultiplexedConnection,
    key: &str,
    timeout: Duration,
) -> RedisResult<Option<(String, Vec<u8>)>> {
    redis::cmd("BLPOP")
        .arg(key)
        .arg(timeout.as_secs_f64())
        .query_async(conn)
        .await
}

fn broker_error(e: redis::RedisError) -> ClientError {
    error!("Redis query failed: {:?}", e);
    ClientError::Broker(e.to_string())
}
