//! Error types for RAPI command execution.
//!
//! Every command completes with exactly one outcome. The failures fall into
//! three groups:
//!
//! - transport errors (`Timeout`, `BufferOverflow`, `BadChecksum`,
//!   `BadSequenceId`, `InvalidResponse`, `Transport`), where the controller
//!   may or may not have acted on the command;
//! - protocol rejection (`Rejected`), the controller answered `$NK`;
//! - capacity errors (`QueueFull`, `CommandTooLong`), reported synchronously
//!   before anything is written to the link.
//!
//! The engine never retries; callers decide.

/// Result type alias for RAPI operations.
pub type Result<T> = std::result::Result<T, RapiError>;

/// Errors that can complete a RAPI command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RapiError {
    /// The controller answered `$NK`.
    #[error("Command rejected: {command}")]
    Rejected { command: String },

    /// A reply arrived that is neither `$OK`, `$NK` nor an async event.
    #[error("Invalid response: {response}")]
    InvalidResponse { response: String },

    /// The encoded command does not fit the controller's receive buffer.
    #[error("Command too long: {length} bytes (max {max})")]
    CommandTooLong { length: usize, max: usize },

    /// The frame checksum does not match the XOR of its bytes.
    #[error("Bad checksum: expected {expected:02X}, received {received}")]
    BadChecksum { expected: u8, received: String },

    /// The reply carries a sequence id other than the outstanding one.
    #[error("Bad sequence id: expected {expected:02X}, received {received:02X}")]
    BadSequenceId { expected: u8, received: u8 },

    /// No reply before the command's deadline.
    #[error("Command timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// An inbound frame exceeded the receive buffer before its terminator.
    #[error("Receive buffer overflow")]
    BufferOverflow,

    /// The command queue is at capacity.
    #[error("Command queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Writing to or configuring the underlying link failed.
    #[error("Transport error: {message}")]
    Transport { message: String },
}

impl RapiError {
    /// Create a new rejected error.
    pub fn rejected(command: impl Into<String>) -> Self {
        Self::Rejected {
            command: command.into(),
        }
    }

    /// Create a new invalid response error.
    pub fn invalid_response(response: impl Into<String>) -> Self {
        Self::InvalidResponse {
            response: response.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Create a new transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns `true` when the controller may or may not have executed the
    /// command.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::BufferOverflow
                | Self::BadChecksum { .. }
                | Self::BadSequenceId { .. }
                | Self::InvalidResponse { .. }
                | Self::Transport { .. }
        )
    }

    /// Returns `true` for errors raised before the command reached the link.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::CommandTooLong { .. })
    }
}

impl From<std::io::Error> for RapiError {
    fn from(err: std::io::Error) -> Self {
        Self::transport(err.to_string())
    }
}
