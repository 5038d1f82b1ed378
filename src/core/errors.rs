use thiserror::Error;
use super::types::{FileId, UploadStatus};
use super::task::TaskEvent;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload file not found: {0}")]
    NotFound(FileId),

    #[error("Cannot {event} a task in state {from}")]
    InvalidTransition {
        from: UploadStatus,
        event: TaskEvent,
    },

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("IO error {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl UploadError {
    pub fn invalid_transition(from: UploadStatus, event: TaskEvent) -> Self {
        Self::InvalidTransition { from, event }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput(message.into())
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::TransportFailure(reason.into())
    }
}

impl From<toml::de::Error> for UploadError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<url::ParseError> for UploadError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid url: {}", err))
    }
}

pub type Result<T, E = UploadError> = std::result::Result<T, E>;
