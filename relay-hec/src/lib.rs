pub mod config;
mod event;

pub use crate::config::HecConfig;
pub use crate::event::{EventBuilder, HecEvent};

use async_trait::async_trait;
use relay_core::prelude::{ForwardError, Forwarder, Message};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::{debug, trace};

/// Acknowledgement body returned by the collector.
#[derive(Debug, Deserialize)]
struct HecResponse {
    text: String,
    code: i64,
}

/// [`Forwarder`] posting each message to a Splunk HTTP Event Collector.
pub struct HecForwarder {
    http: reqwest::Client,
    endpoint: String,
    authorization: String,
    builder: EventBuilder,
}

impl HecForwarder {
    /// # Errors
    ///
    /// Returns [`ForwardError::Configuration`] if the configuration is invalid
    /// and [`ForwardError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &HecConfig) -> Result<Self, ForwardError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(!config.validate_certificates)
            .build()
            .map_err(|e| ForwardError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: config.endpoint(),
            authorization: format!("Splunk {}", config.token),
            builder: EventBuilder::from_config(config),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Forwarder for HecForwarder {
    async fn forward(&self, message: Message) -> Result<(), ForwardError> {
        let payload = serde_json::to_vec(&self.builder.build(&message))
            .map_err(|e| ForwardError::Encode(e.to_string()))?;
        trace!("Posting {} bytes for message {}", payload.len(), message.id);

        let response = self
            .http
            .post(&self.endpoint)
            .header(AUTHORIZATION, &self.authorization)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ForwardError::Transport(e.to_string()))?;
        let ack = serde_json::from_str::<HecResponse>(&body).ok();

        if !status.is_success() {
            return Err(ForwardError::Rejected {
                status: status.as_u16(),
                reason: ack.map_or(body, |ack| ack.text),
            });
        }
        if let Some(ack) = ack
            && ack.code != 0
        {
            return Err(ForwardError::Rejected {
                status: status.as_u16(),
                reason: format!("{} (code {})", ack.text, ack.code),
            });
        }

        debug!("Forwarded message {} to {}", message.id, self.endpoint);
        Ok(())
    }
}
