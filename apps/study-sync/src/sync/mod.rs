//! Synchronization between the local store and the remote scheduler.

pub mod coordinator;
pub mod payload;
pub mod pull;
pub mod push;
pub mod status;

use std::fmt;

use serde::Serialize;

use crate::db::DbError;
use crate::remote::RemoteError;

pub use coordinator::{CoordinatorHandle, CycleOutcome, SyncCoordinator};
pub use pull::{PullReport, PullSynchronizer};
pub use push::{PushReport, PushSynchronizer};
pub use status::{SyncPhase, SyncStatus};

/// Sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Remote scheduler unreachable: {0}")]
    Unreachable(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Local commit failed: {0}")]
    Commit(#[source] DbError),
}

/// A phase stopped early. `partial` holds the statistics gathered so far;
/// everything they count has been committed locally.
#[derive(Debug)]
pub struct Aborted<R> {
    pub error: SyncError,
    pub partial: R,
}

impl<R> Aborted<R> {
    pub fn new(error: impl Into<SyncError>, partial: R) -> Self {
        Self {
            error: error.into(),
            partial,
        }
    }
}

impl<R: fmt::Debug> fmt::Display for Aborted<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl<R: fmt::Debug> std::error::Error for Aborted<R> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Per-item failure that did not stop the phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemError {
    pub content_key: String,
    pub message: String,
}

impl ItemError {
    pub fn new(content_key: impl Into<String>, message: impl ToString) -> Self {
        Self {
            content_key: content_key.into(),
            message: message.to_string(),
        }
    }
}
