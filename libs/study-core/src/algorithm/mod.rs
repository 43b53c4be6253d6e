//! Local scheduling used before an item has been round-tripped through the
//! remote scheduler, plus forgetting-curve helpers shared with pull mapping.

pub mod retention;
pub mod sm2;

use crate::types::{Rating, ReviewState};
use chrono::{DateTime, Utc};

/// Result of scheduling an item after a review.
#[derive(Debug, Clone)]
pub struct SchedulingResult {
    pub new_state: ReviewState,
    pub next_due: DateTime<Utc>,
}

/// Scheduler applied locally when no remote round-trip has happened yet.
pub trait LocalScheduler: Send + Sync {
    /// Scheduler identifier, recorded with each review.
    fn name(&self) -> &'static str;

    /// Calculate the next review state after a review.
    fn schedule(&self, state: &ReviewState, rating: Rating, now: DateTime<Utc>)
        -> SchedulingResult;
}
