//! Manager configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration:
//!
//! ```
//! use openevse_manager::ManagerConfig;
//!
//! let config = ManagerConfig::from_json(r#"{"sleep_for_disable": false, "rapi": {"timeout_ms": 750}}"#).unwrap();
//! assert!(!config.sleep_for_disable);
//! assert_eq!(config.rapi.timeout_ms, 750);
//! assert_eq!(config.retry_ms, 1000);
//! ```

use openevse_core::constants::{
    DEFAULT_CHARGE_POLL_MS, DEFAULT_CONNECT_RETRY_MS, DEFAULT_PUSH_RETRY_MS,
    DEFAULT_STATUS_POLL_MS, DEFAULT_TEMPERATURE_POLL_MS,
};
use openevse_rapi::RapiConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Settings of the underlying command engine.
    pub rapi: RapiConfig,

    /// Delay between handshake attempts while the controller is silent.
    pub connect_retry_ms: u64,

    /// Interval of the `$GS` status poll while connected.
    pub status_poll_ms: u64,

    /// Interval of the `$GG` current and voltage poll while charging.
    pub charge_poll_ms: u64,

    /// Interval of the `$GP` temperature poll while connected.
    pub temperature_poll_ms: u64,

    /// Delay before re-asserting the target after a failed push.
    pub retry_ms: u64,

    /// Disable with `$FS` (sleep) rather than `$FD`.
    pub sleep_for_disable: bool,

    /// User ceiling on the pilot in amps. The hardware maximum still applies
    /// on top of it.
    pub max_configured_current: Option<u32>,

    /// Drop `auto_release` claims when the vehicle is unplugged.
    pub release_auto_claims_on_disconnect: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            rapi: RapiConfig::default(),
            connect_retry_ms: DEFAULT_CONNECT_RETRY_MS,
            status_poll_ms: DEFAULT_STATUS_POLL_MS,
            charge_poll_ms: DEFAULT_CHARGE_POLL_MS,
            temperature_poll_ms: DEFAULT_TEMPERATURE_POLL_MS,
            retry_ms: DEFAULT_PUSH_RETRY_MS,
            sleep_for_disable: true,
            max_configured_current: None,
            release_auto_claims_on_disconnect: true,
        }
    }
}

impl ManagerConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ManagerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Reject values the manager cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rapi.timeout_ms == 0 {
            return Err(ConfigError::invalid("rapi.timeout_ms", "must be greater than zero"));
        }
        if self.rapi.queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "rapi.queue_capacity",
                "must be greater than zero",
            ));
        }
        for (field, value) in [
            ("connect_retry_ms", self.connect_retry_ms),
            ("status_poll_ms", self.status_poll_ms),
            ("charge_poll_ms", self.charge_poll_ms),
            ("temperature_poll_ms", self.temperature_poll_ms),
            ("retry_ms", self.retry_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }
        if self.max_configured_current == Some(0) {
            return Err(ConfigError::invalid(
                "max_configured_current",
                "must be at least one amp",
            ));
        }
        Ok(())
    }

    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }

    pub fn status_poll(&self) -> Duration {
        Duration::from_millis(self.status_poll_ms)
    }

    pub fn charge_poll(&self) -> Duration {
        Duration::from_millis(self.charge_poll_ms)
    }

    pub fn temperature_poll(&self) -> Duration {
        Duration::from_millis(self.temperature_poll_ms)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }
}
