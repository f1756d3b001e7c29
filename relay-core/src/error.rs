use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Messaging client error: {0}")]
    Client(#[from] ClientError),
    #[error("Forwarding error: {0}")]
    Forward(#[from] ForwardError),
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Failures reported by a [`MessagingClient`](crate::client::MessagingClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The blocking receive was woken by an interrupt rather than a message.
    #[error("Receive interrupted")]
    Interrupted,
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Broker error: {0}")]
    Broker(String),
    #[error("No connection has been opened")]
    NotConnected,
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Event rejected by collector ({status}): {reason}")]
    Rejected { status: u16, reason: String },
    #[error("Encoding error: {0}")]
    Encode(String),
}
