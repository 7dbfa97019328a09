use openevse_core::constants::{DEFAULT_QUEUE_CAPACITY, DEFAULT_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`RapiSender`](crate::RapiSender).
///
/// # Example
///
/// ```
/// use openevse_rapi::RapiConfig;
///
/// let config: RapiConfig = serde_json::from_str(r#"{"sequence_ids": true}"#).unwrap();
/// assert!(config.sequence_ids);
/// assert_eq!(config.timeout_ms, 500);
/// assert_eq!(config.queue_capacity, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RapiConfig {
    /// Default reply deadline per command.
    pub timeout_ms: u64,

    /// Commands that may wait behind the one in flight.
    pub queue_capacity: usize,

    /// Tag commands with sequence ids and reject replies that do not echo
    /// them.
    pub sequence_ids: bool,
}

impl RapiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RapiConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sequence_ids: false,
        }
    }
}
