//! Scheduled consumer that drains a broker destination and forwards every
//! message to an event-ingestion endpoint.

mod client;
mod config;
mod consumer;
mod context;
mod error;
mod forwarder;
mod interrupt;
mod model;
mod object;
mod processor;

pub mod prelude {
    pub use crate::client::MessagingClient;
    pub use crate::forwarder::Forwarder;

    pub use crate::config::ConsumerConfig;
    pub use crate::consumer::ConsumerTask;
    pub use crate::interrupt::Interrupt;
    pub use crate::processor::ConsumerProcessor;

    pub use crate::model::Message;
    pub use crate::object::{Destination, DestinationKind, MessageId};

    pub use crate::error::{ClientError, ForwardError, RelayError};
}
