//! Forgetting-curve helpers.
//!
//! Uses the FSRS power curve `R = (1 + t / (9 * S))^-1`, where `t` is days
//! since the last review and `S` the stability in days. At `t == S` the
//! curve gives exactly 0.9.

use crate::types::ReviewState;
use chrono::{DateTime, Duration, Utc};

/// Stability mirrored from a remote interval: never below one day.
pub fn stability_from_interval(interval_days: f64) -> f64 {
    interval_days.max(1.0)
}

/// Difficulty in [0, 1] derived from an SM-2 style ease factor.
pub fn difficulty_from_ease(ease_factor: f64) -> f64 {
    ((3.0 - ease_factor) / 2.0).clamp(0.0, 1.0)
}

/// Probability of recall after `elapsed_days` at the given stability.
pub fn forgetting_curve(elapsed_days: f64, stability: f64) -> f64 {
    if stability <= 0.0 {
        return 0.0;
    }
    (1.0 + elapsed_days.max(0.0) / (9.0 * stability)).powf(-1.0)
}

/// Days since the last review, inferred from due date minus interval.
///
/// None when there is no due date or the inferred review date is out of range.
pub fn elapsed_days(state: &ReviewState, now: DateTime<Utc>) -> Option<f64> {
    let due = state.due_date?;
    let interval_secs = (state.interval_days * 86400.0) as i64;
    let last_review = due.checked_sub_signed(Duration::try_seconds(interval_secs)?)?;
    let elapsed = now.signed_duration_since(last_review);
    Some((elapsed.num_seconds() as f64 / 86400.0).max(0.0))
}

/// Current recall probability, or None for items never reviewed.
pub fn current_retrievability(state: &ReviewState, now: DateTime<Utc>) -> Option<f64> {
    if !state.is_reviewed() {
        return None;
    }
    let stability = state
        .stability
        .unwrap_or_else(|| stability_from_interval(state.interval_days));
    match elapsed_days(state, now) {
        Some(elapsed) => Some(forgetting_curve(elapsed, stability)),
        None => state.retrievability,
    }
}
