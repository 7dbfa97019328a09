use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid EVSE state: {0}")]
    InvalidState(String),

    #[error("Invalid client id: {0}")]
    InvalidClient(String),

    #[error("Invalid hardware state: {0}")]
    InvalidHardwareState(String),

    #[error("Invalid version string: {0}")]
    InvalidVersion(String),

    #[error("Malformed {command} reply: {reply}")]
    MalformedReply { command: &'static str, reply: String },
}

impl Error {
    pub fn malformed_reply(command: &'static str, reply: impl Into<String>) -> Self {
        Error::MalformedReply {
            command,
            reply: reply.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
