//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
