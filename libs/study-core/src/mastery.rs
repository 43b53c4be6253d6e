//! Section mastery scoring.
//!
//! Turns three optional signals into a composite 0-100 score plus a
//! remediation classification:
//! - retrievability: current recall probability (0-1)
//! - average lapses per reviewed item
//! - quiz accuracy (0-100)
//!
//! Missing retrievability counts as 0.5 inside the score but as 1.0 for the
//! mastery and remediation gates.

use crate::types::{MasteryResult, RemediationReason};

const RETRIEVABILITY_WEIGHT: f64 = 0.40;
const LAPSE_WEIGHT: f64 = 0.25;
const QUIZ_WEIGHT: f64 = 0.25;
const BASE_BONUS: f64 = 10.0;
/// Average lapses at which the lapse component bottoms out.
const LAPSE_SATURATION: f64 = 5.0;

const SCORE_DEFAULT_RETRIEVABILITY: f64 = 0.5;
const GATE_DEFAULT_RETRIEVABILITY: f64 = 1.0;
const SCORE_DEFAULT_QUIZ: f64 = 50.0;
const GATE_DEFAULT_QUIZ: f64 = 100.0;

const MASTERED_RETRIEVABILITY: f64 = 0.90;
const MASTERED_MAX_LAPSES: f64 = 2.0;

const REMEDIATE_RETRIEVABILITY: f64 = 0.70;
const REMEDIATE_LAPSES: f64 = 3.0;
const REMEDIATE_QUIZ: f64 = 80.0;

const PRIORITY_RETRIEVABILITY: u32 = 3;
const PRIORITY_LAPSES: u32 = 2;
const PRIORITY_QUIZ: u32 = 1;

/// Score a section from its scheduling and quiz signals.
pub fn score(
    retrievability: Option<f64>,
    avg_lapses: Option<f64>,
    quiz_accuracy: Option<f64>,
) -> MasteryResult {
    let lapses = avg_lapses.unwrap_or(0.0);

    let retrievability_part =
        RETRIEVABILITY_WEIGHT * (retrievability.unwrap_or(SCORE_DEFAULT_RETRIEVABILITY) * 100.0);
    let lapse_part = LAPSE_WEIGHT * (1.0 - (lapses / LAPSE_SATURATION).min(1.0)) * 100.0;
    let quiz_part = QUIZ_WEIGHT * quiz_accuracy.unwrap_or(SCORE_DEFAULT_QUIZ);
    let score = (retrievability_part + lapse_part + quiz_part + BASE_BONUS).clamp(0.0, 100.0);

    let gate_retrievability = retrievability.unwrap_or(GATE_DEFAULT_RETRIEVABILITY);
    let is_mastered =
        gate_retrievability >= MASTERED_RETRIEVABILITY && lapses < MASTERED_MAX_LAPSES;

    let mut fired = Vec::with_capacity(3);
    let mut priority = 0;
    if gate_retrievability < REMEDIATE_RETRIEVABILITY {
        fired.push(RemediationReason::LowRetrievability);
        priority += PRIORITY_RETRIEVABILITY;
    }
    if lapses > REMEDIATE_LAPSES {
        fired.push(RemediationReason::HighLapses);
        priority += PRIORITY_LAPSES;
    }
    if quiz_accuracy.unwrap_or(GATE_DEFAULT_QUIZ) < REMEDIATE_QUIZ {
        fired.push(RemediationReason::LowQuizAccuracy);
        priority += PRIORITY_QUIZ;
    }

    let reason = match fired.as_slice() {
        [] => None,
        [single] => Some(*single),
        _ => Some(RemediationReason::Combined),
    };

    MasteryResult {
        score,
        is_mastered,
        needs_remediation: !fired.is_empty(),
        reason,
        priority,
    }
}
