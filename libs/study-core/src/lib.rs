//! Core study library shared by the sync agent and any study front end.
//!
//! Provides:
//! - Learning item and review-state types
//! - Mastery scoring for sections (scheduling + quiz signals)
//! - Adaptive interleaving of due, new and remediation items
//! - Local fallback scheduling (SM-2) and forgetting-curve helpers

pub mod algorithm;
pub mod error;
pub mod interleave;
pub mod mastery;
pub mod types;

pub use algorithm::{LocalScheduler, SchedulingResult};
pub use error::{CoreError, Result};
pub use interleave::{
    build_queue, build_queue_with_rng, plan_queue, remediation_ratio, InterleaveConfig, QueuePlan,
    RemediationCandidate,
};
pub use mastery::score;
pub use types::{
    ItemType, LearningItem, MasteryResult, QualityThresholds, QueueSource, Rating,
    RemediationReason, ReviewState, ReviewStatus, StudyQueue, StudyQueueEntry,
};
