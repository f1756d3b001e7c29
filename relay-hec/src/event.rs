use crate::config::HecConfig;
use relay_core::prelude::Message;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// One HEC event envelope as posted to `/services/collector/event`.
#[derive(Debug, Serialize)]
pub struct HecEvent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<&'a str>,
    pub source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sourcetype: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<&'a str, &'a str>,
    pub event: Value,
}

/// Maps broker messages onto HEC envelopes using the configured metadata.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    host: Option<String>,
    source: Option<String>,
    sourcetype: Option<String>,
    index: Option<String>,
    include_properties: bool,
}

impl EventBuilder {
    pub fn from_config(config: &HecConfig) -> Self {
        Self {
            host: config.host.clone(),
            source: config.source.clone(),
            sourcetype: config.sourcetype.clone(),
            index: config.index.clone(),
            include_properties: config.include_properties,
        }
    }

    pub fn build<'a>(&'a self, message: &'a Message) -> HecEvent<'a> {
        let mut fields = BTreeMap::new();
        if self.include_properties {
            // Broker properties take precedence over the generated id.
            fields.insert("message_id", message.id.as_str());
            fields.extend(
                message
                    .properties
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str())),
            );
        }

        HecEvent {
            time: message.timestamp.map(epoch_seconds),
            host: self.host.as_deref(),
            source: self.source.as_deref().unwrap_or(&message.destination.name),
            sourcetype: self.sourcetype.as_deref(),
            index: self.index.as_deref(),
            fields,
            event: body_value(message),
        }
    }
}

/// JSON bodies are embedded as-is; anything else is sent as text.
fn body_value(message: &Message) -> Value {
    serde_json::from_slice(&message.body)
        .unwrap_or_else(|_| Value::String(message.body_text().into_owned()))
}

// HEC takes epoch seconds; keep millisecond precision.
fn epoch_seconds(timestamp: OffsetDateTime) -> f64 {
    let millis = timestamp.unix_timestamp_nanos() / 1_000_000;
    millis as f64 / 1000.0
}
