//! Foreground study operations on the local store.

use std::collections::HashMap;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use study_core::algorithm::retention::current_retrievability;
use study_core::algorithm::sm2::Sm2;
use study_core::{
    build_queue, score, LearningItem, LocalScheduler, Rating, RemediationCandidate, ReviewState,
    ReviewStatus, StudyQueue,
};
use tracing::debug;

use crate::config::StudyConfig;
use crate::db::date_utils::study_day_end;
use crate::db::{
    DbError, ItemRepository, QuizAttempt, ReviewLogEntry, SectionMastery, SqliteRepository,
    StudyRepository,
};

type Result<T> = std::result::Result<T, DbError>;

/// Outcome of a recorded review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionOutcome {
    /// True when the local fallback scheduler updated the item.
    pub applied_locally: bool,
    pub state: ReviewState,
}

/// Record a review interaction.
///
/// Items that have never been round-tripped through the remote scheduler are
/// rescheduled locally with SM-2. For everything else the remote owns the
/// schedule, so only the log entry is written and the next pull brings the
/// new state.
pub fn record_interaction(
    repo: &SqliteRepository,
    content_key: &str,
    rating: Rating,
    now: DateTime<Utc>,
) -> Result<InteractionOutcome> {
    let item = repo
        .get_item(content_key)?
        .ok_or_else(|| DbError::ItemNotFound(content_key.to_string()))?;
    let applied_locally = item.is_local_only();
    let before = item.review;

    let (state, scheduler) = if applied_locally {
        let scheduler = Sm2::default();
        let result = scheduler.schedule(&before, rating, now);
        repo.save_review_state(content_key, &result.new_state)?;
        (result.new_state, Some(scheduler.name().to_string()))
    } else {
        (before.clone(), None)
    };

    repo.insert_review_log(&ReviewLogEntry {
        content_key: content_key.to_string(),
        reviewed_at: now,
        rating,
        interval_before: before.interval_days,
        interval_after: state.interval_days,
        ease_before: before.ease_factor,
        ease_after: state.ease_factor,
        scheduler,
        applied_locally,
    })?;

    Ok(InteractionOutcome {
        applied_locally,
        state,
    })
}

/// Record one quiz answer for a section of a module.
pub fn record_quiz_attempt(
    repo: &SqliteRepository,
    module_id: &str,
    section_id: &str,
    content_key: Option<&str>,
    correct: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    repo.insert_quiz_attempt(&QuizAttempt {
        module_id: module_id.to_string(),
        section_id: section_id.to_string(),
        content_key: content_key.map(str::to_string),
        correct,
        answered_at: now,
    })?;
    Ok(())
}

/// Aggregated mastery inputs for one section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionSignals {
    /// Mean current recall probability over reviewed items.
    pub retrievability: Option<f64>,
    /// Mean lapses over reviewed items.
    pub avg_lapses: Option<f64>,
    /// Quiz accuracy in percent.
    pub quiz_accuracy: Option<f64>,
}

pub fn section_signals(
    items: &[LearningItem],
    quiz_accuracy: Option<f64>,
    now: DateTime<Utc>,
) -> SectionSignals {
    let reviewed: Vec<&ReviewState> = items
        .iter()
        .map(|item| &item.review)
        .filter(|state| state.is_reviewed())
        .collect();

    let recall: Vec<f64> = reviewed
        .iter()
        .filter_map(|state| current_retrievability(state, now))
        .collect();

    SectionSignals {
        retrievability: mean(&recall),
        avg_lapses: mean(
            &reviewed
                .iter()
                .map(|state| f64::from(state.lapses))
                .collect::<Vec<_>>(),
        ),
        quiz_accuracy,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Score one section and store the evaluation.
pub fn evaluate_section(
    repo: &SqliteRepository,
    module_id: &str,
    section_id: &str,
    now: DateTime<Utc>,
) -> Result<SectionMastery> {
    let items = repo.list_items_in_section(module_id, section_id)?;
    let signals = section_signals(&items, repo.quiz_accuracy(module_id, section_id)?, now);
    let result = score(signals.retrievability, signals.avg_lapses, signals.quiz_accuracy);
    debug!(
        module = module_id,
        section = section_id,
        score = result.score,
        remediate = result.needs_remediation,
        "section evaluated"
    );

    let evaluation = SectionMastery {
        section_id: section_id.to_string(),
        module_id: module_id.to_string(),
        evaluated_at: now,
        result,
    };
    repo.save_section_mastery(&evaluation)?;
    Ok(evaluation)
}

/// Evaluate every section that has items.
pub fn evaluate_all_sections(repo: &SqliteRepository, now: DateTime<Utc>) -> Result<Vec<SectionMastery>> {
    repo.list_sections()?
        .into_iter()
        .map(|(module_id, section_id)| evaluate_section(repo, &module_id, &section_id, now))
        .collect()
}

/// Assemble today's study queue.
///
/// Due items are those due before the study day ends. New items have never
/// been reviewed. Remediation items are reviewed, not-yet-due items from
/// sections whose latest evaluation flagged them, weakest recall first.
pub fn build_study_queue(
    repo: &SqliteRepository,
    config: &StudyConfig,
    now: DateTime<Local>,
) -> Result<StudyQueue<LearningItem>> {
    let cutoff = study_day_end(config.daily_reset_hour, now);
    let now_utc = now.with_timezone(&Utc);

    let latest = repo.latest_section_mastery()?;
    let struggling: HashMap<(&str, &str), u32> = latest
        .iter()
        .filter(|m| m.result.needs_remediation)
        .map(|m| ((m.module_id.as_str(), m.section_id.as_str()), m.result.priority))
        .collect();

    let mut due = Vec::new();
    let mut new_pool = Vec::new();
    let mut remediation = Vec::new();
    for item in repo.list_items()? {
        let flagged = struggling
            .get(&(item.module_id.as_str(), item.section_id.as_str()))
            .copied();
        let state = &item.review;
        if state.status == ReviewStatus::Suspended {
            continue;
        }
        if state.is_due_by(cutoff) {
            due.push(item);
        } else if !state.is_reviewed() && state.due_date.is_none() {
            new_pool.push(item);
        } else if let Some(priority) = flagged {
            if state.is_reviewed() {
                let recall = current_retrievability(state, now_utc).unwrap_or(1.0);
                remediation.push((recall, RemediationCandidate { item, priority }));
            }
        }
    }

    due.sort_by_key(|item| item.review.due_date);
    remediation.sort_by(|a, b| a.0.total_cmp(&b.0));
    let remediation = remediation.into_iter().map(|(_, c)| c).collect();

    Ok(build_queue(
        due,
        new_pool,
        remediation,
        struggling.len(),
        &config.interleave,
    ))
}
