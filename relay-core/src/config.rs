use crate::error::RelayError;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub receive_timeout_millis: u64,
    pub initial_delay_secs: u64,
    pub delay_secs: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            receive_timeout_millis: 15_000,
            initial_delay_secs: 5,
            delay_secs: 60,
        }
    }
}

impl ConsumerConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_millis)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    /// # Errors
    /// Returns [`RelayError::Configuration`] when the repeat delay or the receive timeout is zero.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.delay_secs == 0 {
            return Err(RelayError::Configuration(
                "delay_secs must be greater than zero".to_string(),
            ));
        }
        if self.receive_timeout_millis == 0 {
            return Err(RelayError::Configuration(
                "receive_timeout_millis must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
