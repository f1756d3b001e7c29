use relay_core::prelude::ForwardError;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct HecConfig {
    /// Base URL of the collector, e.g. `https://splunk.example.com:8088`.
    pub url: String,
    pub token: String,
    pub index: Option<String>,
    pub source: Option<String>,
    pub sourcetype: Option<String>,
    pub host: Option<String>,
    pub request_timeout_millis: u64,
    pub validate_certificates: bool,
    pub include_properties: bool,
}

impl Default for HecConfig {
    fn default() -> Self {
        Self {
            url: "https://localhost:8088".to_owned(),
            token: String::new(),
            index: None,
            source: None,
            sourcetype: None,
            host: None,
            request_timeout_millis: 10_000,
            validate_certificates: true,
            include_properties: true,
        }
    }
}

impl HecConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_millis)
    }

    pub fn endpoint(&self) -> String {
        format!("{}/services/collector/event", self.url.trim_end_matches('/'))
    }

    /// # Errors
    ///
    /// Returns [`ForwardError::Configuration`] for an empty URL or a zero
    /// request timeout.
    pub fn validate(&self) -> Result<(), ForwardError> {
        if self.url.trim().is_empty() {
            return Err(ForwardError::Configuration(
                "url must not be empty".to_string(),
            ));
        }
        if self.request_timeout_millis == 0 {
            return Err(ForwardError::Configuration(
                "request_timeout_millis must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for HecConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HecConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("index", &self.index)
            .field("source", &self.source)
            .field("sourcetype", &self.sourcetype)
            .field("host", &self.host)
            .field("request_timeout_millis", &self.request_timeout_millis)
            .field("validate_certificates", &self.validate_certificates)
            .field("include_properties", &self.include_properties)
            .finish()
    }
}
