//! Connection and pipeline configuration.
//!
//! Both structs deserialize with serde, filling unspecified fields from
//! [`Default`], so embedders can load them from whatever format their
//! listener configuration already uses.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Invalid configuration value.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A channel capacity or limit was zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// Per-connection driver settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Window without inbound or outbound activity after which an idle
    /// timeout is reported. `None` disables idle detection.
    pub idle_timeout_ms: Option<u64>,
    /// Capacity of the inbound event channel.
    pub event_capacity: usize,
    /// Capacity of the command channel used by connection handles.
    pub command_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: None,
            event_capacity: 64,
            command_capacity: 16,
        }
    }
}

impl ConnectionConfig {
    /// Report an idle timeout after `timeout` without traffic.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity;
        self
    }

    /// Idle window, if idle detection is enabled.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> { self.idle_timeout_ms.map(Duration::from_millis) }

    /// Check that every capacity is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Zero`] for a zero capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "event_capacity",
            });
        }
        if self.command_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "command_capacity",
            });
        }
        Ok(())
    }
}

/// Settings for serving pipelined HTTP requests on one connection.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of requests handled concurrently. Further requests
    /// wait until the oldest outstanding response has been released.
    pub max_in_flight: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self { Self { max_in_flight: 8 } }
}

impl PipelineConfig {
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Zero`] if `max_in_flight` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_in_flight == 0 {
            return Err(ConfigError::Zero {
                field: "max_in_flight",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{ "idle_timeout_ms": 1500 }"#).expect("parse config");
        assert_eq!(config.idle_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.event_capacity, ConnectionConfig::default().event_capacity);
    }

    #[test]
    fn idle_detection_is_off_by_default() {
        assert_eq!(ConnectionConfig::default().idle_timeout(), None);
    }

    #[rstest]
    #[case(ConnectionConfig::default().with_event_capacity(0), "event_capacity")]
    #[case(ConnectionConfig::default().with_command_capacity(0), "command_capacity")]
    fn zero_capacities_are_rejected(#[case] config: ConnectionConfig, #[case] field: &'static str) {
        assert_eq!(config.validate(), Err(ConfigError::Zero { field }));
    }

    #[test]
    fn pipeline_limit_must_be_positive() {
        assert!(PipelineConfig::default().validate().is_ok());
        assert_eq!(
            PipelineConfig::default().with_max_in_flight(0).validate(),
            Err(ConfigError::Zero {
                field: "max_in_flight"
            })
        );
    }
}
