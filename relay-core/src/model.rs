use crate::object::{Destination, MessageId};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// One message received from the broker. Forwarded once, then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub destination: Destination,
    pub body: Vec<u8>,
    pub properties: BTreeMap<String, String>,
    pub timestamp: Option<OffsetDateTime>,
}

impl Message {
    pub fn new(destination: Destination, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: MessageId::default(),
            destination,
            body: body.into(),
            properties: BTreeMap::new(),
            timestamp: None,
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}
