//! Error types for study-core.

use thiserror::Error;

/// Result type alias using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by core type conversions and config validation.
#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("unknown item type: {0}")]
    UnknownItemType(String),

    #[error("unknown remediation reason: {0}")]
    UnknownReason(String),

    #[error("rating out of range: {0}")]
    InvalidRating(u8),

    #[error("invalid interleave config: {0}")]
    InvalidInterleaveConfig(String),

    #[error("quality threshold for {item_type} must be within 0..=1, got {value}")]
    InvalidThreshold { item_type: String, value: f64 },
}
