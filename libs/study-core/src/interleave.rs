//! Adaptive interleaving of due, new and remediation items.
//!
//! Due items are time-critical: they always lead the queue in their original
//! order and never count against the new-item budget. The budget is split
//! between new and remediation items according to how many sections are
//! currently struggling, then the selected items are shuffled together.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{QueueSource, StudyQueue, StudyQueueEntry};

/// Budget and ratio settings for queue construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterleaveConfig {
    /// Slots shared by new and remediation items.
    pub new_budget: usize,
    /// Remediation ratio with a single struggling section.
    pub base_ratio: f64,
    pub max_ratio: f64,
    /// Struggling-section count at which `max_ratio` applies.
    pub sections_for_max_ratio: usize,
    /// Hard cap on remediation items per queue.
    pub remediation_ceiling: usize,
}

impl Default for InterleaveConfig {
    fn default() -> Self {
        Self {
            new_budget: 20,
            base_ratio: 0.30,
            max_ratio: 0.50,
            sections_for_max_ratio: 5,
            remediation_ceiling: 15,
        }
    }
}

impl InterleaveConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(0.0..=1.0).contains(&self.base_ratio) || !(0.0..=1.0).contains(&self.max_ratio) {
            return Err(CoreError::InvalidInterleaveConfig(
                "ratios must be within 0..=1".to_string(),
            ));
        }
        if self.base_ratio > self.max_ratio {
            return Err(CoreError::InvalidInterleaveConfig(format!(
                "base_ratio {} exceeds max_ratio {}",
                self.base_ratio, self.max_ratio
            )));
        }
        Ok(())
    }
}

/// Remediation item with the caller-supplied priority used for truncation.
#[derive(Debug, Clone, PartialEq)]
pub struct RemediationCandidate<T> {
    pub item: T,
    pub priority: u32,
}

/// Slot allocation for one queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuePlan {
    pub ratio: f64,
    pub remediation_count: usize,
    pub new_count: usize,
}

/// Share of the new-item budget given to remediation.
///
/// Zero with no struggling sections, `max_ratio` at or beyond
/// `sections_for_max_ratio`, linear from `base_ratio` in between.
pub fn remediation_ratio(struggling_sections: usize, cfg: &InterleaveConfig) -> f64 {
    if struggling_sections == 0 {
        return 0.0;
    }
    if struggling_sections >= cfg.sections_for_max_ratio {
        return cfg.max_ratio;
    }
    let progress = struggling_sections as f64 / cfg.sections_for_max_ratio as f64;
    cfg.base_ratio + (cfg.max_ratio - cfg.base_ratio) * progress
}

/// Allocate slots: cap remediation by ratio, ceiling and availability, then
/// give the rest of the budget to new items.
pub fn plan_queue(
    struggling_sections: usize,
    new_available: usize,
    remediation_available: usize,
    cfg: &InterleaveConfig,
) -> QueuePlan {
    let ratio = remediation_ratio(struggling_sections, cfg);
    let nominal = (cfg.new_budget as f64 * ratio).floor() as usize;
    let remediation_count = nominal
        .min(cfg.remediation_ceiling)
        .min(remediation_available);
    let new_count = cfg
        .new_budget
        .saturating_sub(remediation_count)
        .min(new_available);

    QueuePlan {
        ratio,
        remediation_count,
        new_count,
    }
}

/// Build a study queue using the thread-local RNG for the shuffle.
pub fn build_queue<T>(
    due: Vec<T>,
    new_pool: Vec<T>,
    remediation_pool: Vec<RemediationCandidate<T>>,
    struggling_sections: usize,
    cfg: &InterleaveConfig,
) -> StudyQueue<T> {
    build_queue_with_rng(
        due,
        new_pool,
        remediation_pool,
        struggling_sections,
        cfg,
        &mut rand::thread_rng(),
    )
}

/// Build a study queue with an explicit RNG.
pub fn build_queue_with_rng<T, R: Rng + ?Sized>(
    due: Vec<T>,
    new_pool: Vec<T>,
    mut remediation_pool: Vec<RemediationCandidate<T>>,
    struggling_sections: usize,
    cfg: &InterleaveConfig,
    rng: &mut R,
) -> StudyQueue<T> {
    let plan = plan_queue(
        struggling_sections,
        new_pool.len(),
        remediation_pool.len(),
        cfg,
    );

    // Stable sort keeps caller order among equal priorities.
    remediation_pool.sort_by(|a, b| b.priority.cmp(&a.priority));

    let due_count = due.len();
    let mut entries: Vec<StudyQueueEntry<T>> = due
        .into_iter()
        .map(|item| StudyQueueEntry {
            item,
            source: QueueSource::Due,
        })
        .collect();

    let mut mixed: Vec<StudyQueueEntry<T>> = new_pool
        .into_iter()
        .take(plan.new_count)
        .map(|item| StudyQueueEntry {
            item,
            source: QueueSource::New,
        })
        .chain(
            remediation_pool
                .into_iter()
                .take(plan.remediation_count)
                .map(|candidate| StudyQueueEntry {
                    item: candidate.item,
                    source: QueueSource::Remediation,
                }),
        )
        .collect();
    mixed.shuffle(rng);
    entries.extend(mixed);

    StudyQueue {
        entries,
        due_count,
        new_count: plan.new_count,
        remediation_count: plan.remediation_count,
        remediation_ratio: plan.ratio,
    }
}
