//! Client for the remote spaced-repetition scheduler.

pub mod client;
pub mod codes;
pub mod protocol;

pub use client::{Probe, RemoteClient};
pub use protocol::{CardInfo, NewNote, NoteOptions, NoteUpdate, RemoteOutcome, Request};

/// Remote call errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("Remote unreachable: {0}")]
    Unreachable(String),

    #[error("Remote request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote error: {0}")]
    Remote(String),
}

impl RemoteError {
    /// Errors that mean the remote cannot be talked to at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout | Self::Network(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Unreachable(err.to_string())
        } else if err.is_decode() {
            Self::Protocol(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
