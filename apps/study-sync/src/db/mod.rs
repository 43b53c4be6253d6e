//! Local SQLite store: learning items, their scheduling mirror, and study history.

pub mod date_utils;
pub mod error;
pub mod repository;
pub mod schema;

use std::sync::{Arc, Mutex};

pub use error::DbError;
pub use repository::{
    ItemRepository, LocalSyncState, PullApplied, PulledState, PushedItem, QuizAttempt,
    ReviewLogEntry, SectionMastery, SqliteRepository, StudyRepository, SyncRepository,
};

/// Repository handle shared between async tasks. Lock only for the duration
/// of a single store call; never hold the guard across an `.await`.
pub type SharedRepository = Arc<Mutex<SqliteRepository>>;

pub fn shared(repository: SqliteRepository) -> SharedRepository {
    Arc::new(Mutex::new(repository))
}
