//! SM-2 fallback scheduler.
//!
//! Only used for items the remote scheduler has not seen yet; once an item is
//! pulled, the remote state overwrites whatever this produced.

use super::retention::{difficulty_from_ease, stability_from_interval};
use super::{LocalScheduler, SchedulingResult};
use crate::types::{Rating, ReviewState, ReviewStatus};
use chrono::{DateTime, Duration, Utc};

/// SM-2 with configurable parameters.
#[derive(Debug, Clone)]
pub struct Sm2 {
    pub minimum_ease: f64,
    pub easy_bonus: f64,
    pub hard_multiplier: f64,
    pub graduating_interval: f64,
    pub easy_interval: f64,
    /// Interval after a lapse, in days.
    pub relearn_interval: f64,
}

impl Default for Sm2 {
    fn default() -> Self {
        Self {
            minimum_ease: 1.3,
            easy_bonus: 1.3,
            hard_multiplier: 1.2,
            graduating_interval: 1.0,
            easy_interval: 4.0,
            relearn_interval: 1.0,
        }
    }
}

impl LocalScheduler for Sm2 {
    fn name(&self) -> &'static str {
        "sm2"
    }

    fn schedule(&self, state: &ReviewState, rating: Rating, now: DateTime<Utc>) -> SchedulingResult {
        let (status, interval, ease, lapses) = match state.status {
            ReviewStatus::New | ReviewStatus::Learning => self.schedule_learning(state, rating),
            ReviewStatus::Review | ReviewStatus::Relearning | ReviewStatus::Suspended => {
                self.schedule_review(state, rating)
            }
        };

        let next_due = now + Duration::days(interval.ceil() as i64);

        SchedulingResult {
            new_state: ReviewState {
                status,
                interval_days: interval,
                ease_factor: ease,
                stability: Some(stability_from_interval(interval)),
                difficulty: Some(difficulty_from_ease(ease)),
                retrievability: Some(1.0),
                review_count: state.review_count + 1,
                lapses,
                due_date: Some(next_due),
            },
            next_due,
        }
    }
}

impl Sm2 {
    fn schedule_learning(&self, state: &ReviewState, rating: Rating) -> (ReviewStatus, f64, f64, u32) {
        match rating {
            Rating::Easy => (ReviewStatus::Review, self.easy_interval, state.ease_factor, state.lapses),
            Rating::Good => (
                ReviewStatus::Review,
                self.graduating_interval,
                state.ease_factor,
                state.lapses,
            ),
            Rating::Again | Rating::Hard => {
                (ReviewStatus::Learning, 0.0, state.ease_factor, state.lapses)
            }
        }
    }

    fn schedule_review(&self, state: &ReviewState, rating: Rating) -> (ReviewStatus, f64, f64, u32) {
        if rating == Rating::Again {
            return (
                ReviewStatus::Relearning,
                self.relearn_interval,
                (state.ease_factor - 0.2).max(self.minimum_ease),
                state.lapses + 1,
            );
        }

        let (ease_adj, multiplier) = match rating {
            Rating::Hard => (-0.15, self.hard_multiplier),
            Rating::Easy => (0.15, state.ease_factor * self.easy_bonus),
            _ => (0.0, state.ease_factor),
        };
        let interval = (state.interval_days * multiplier).max(1.0);
        let ease = (state.ease_factor + ease_adj).max(self.minimum_ease);
        (ReviewStatus::Review, interval, ease, state.lapses)
    }
}
