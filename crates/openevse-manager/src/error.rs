//! Error types for the claim manager.
//!
//! Claim and release failures are reported through their boolean returns and
//! hardware failures are retried internally, so the only fallible surface
//! left is loading a [`ManagerConfig`](crate::ManagerConfig).

/// Result type alias for manager configuration.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating a manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Cannot read {path}: {message}")]
    Io { path: String, message: String },

    /// The configuration is not valid JSON for this schema.
    #[error("Invalid configuration: {message}")]
    Parse { message: String },

    /// A field holds a value outside its allowed range.
    #[error("Invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse {
            message: err.to_string(),
        }
    }
}
