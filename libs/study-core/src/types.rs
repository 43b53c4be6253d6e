//! Core types for the study library.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Kind of learning item. Each kind carries its own push quality threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Flashcard,
    Cloze,
    Concept,
    Question,
}

impl ItemType {
    pub const ALL: [ItemType; 4] = [Self::Flashcard, Self::Cloze, Self::Concept, Self::Question];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flashcard => "flashcard",
            Self::Cloze => "cloze",
            Self::Concept => "concept",
            Self::Question => "question",
        }
    }
}

impl FromStr for ItemType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flashcard" => Ok(Self::Flashcard),
            "cloze" => Ok(Self::Cloze),
            "concept" => Ok(Self::Concept),
            "question" => Ok(Self::Question),
            other => Err(CoreError::UnknownItemType(other.to_string())),
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Learning status of an item, as mirrored from the remote scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    New,
    Learning,
    Review,
    Relearning,
    Suspended,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Review => "review",
            Self::Relearning => "relearning",
            Self::Suspended => "suspended",
        }
    }

    /// Parse a stored status. Unknown values fall back to `New`.
    pub fn parse(s: &str) -> Self {
        match s {
            "learning" => Self::Learning,
            "review" => Self::Review,
            "relearning" => Self::Relearning,
            "suspended" => Self::Suspended,
            _ => Self::New,
        }
    }
}

/// Rating for a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    /// Convert to 4-point numeric value (1-4).
    pub fn to_value(self) -> u8 {
        match self {
            Self::Again => 1,
            Self::Hard => 2,
            Self::Good => 3,
            Self::Easy => 4,
        }
    }

    /// Create from 4-point numeric value.
    pub fn from_value(value: u8) -> Result<Self, CoreError> {
        match value {
            1 => Ok(Self::Again),
            2 => Ok(Self::Hard),
            3 => Ok(Self::Good),
            4 => Ok(Self::Easy),
            other => Err(CoreError::InvalidRating(other)),
        }
    }
}

/// Scheduling mirror of an item: the remote scheduler's view, or the local
/// fallback schedule when the item has never been round-tripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
    pub status: ReviewStatus,
    pub interval_days: f64,
    pub ease_factor: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrievability: Option<f64>,
    pub review_count: u32,
    pub lapses: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl Default for ReviewState {
    fn default() -> Self {
        Self {
            status: ReviewStatus::New,
            interval_days: 0.0,
            ease_factor: 2.5,
            stability: None,
            difficulty: None,
            retrievability: None,
            review_count: 0,
            lapses: 0,
            due_date: None,
        }
    }
}

impl ReviewState {
    /// True once the item has at least one recorded review.
    pub fn is_reviewed(&self) -> bool {
        self.review_count > 0
    }

    /// True when the item has a due date at or before `cutoff`.
    pub fn is_due_by(&self, cutoff: DateTime<Utc>) -> bool {
        self.status != ReviewStatus::Suspended && self.due_date.is_some_and(|due| due <= cutoff)
    }
}

/// One learning record held in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningItem {
    /// Stable content key; the join key against the remote scheduler.
    pub content_key: String,
    pub item_type: ItemType,
    pub module_id: String,
    pub section_id: String,
    pub front: String,
    pub back: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    /// Remote note id. Null until a push creates or discovers it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<i64>,
    pub review: ReviewState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_hash: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl LearningItem {
    /// Create an unsynced item with a default review state.
    pub fn new(
        content_key: impl Into<String>,
        item_type: ItemType,
        module_id: impl Into<String>,
        section_id: impl Into<String>,
        front: impl Into<String>,
        back: impl Into<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            content_key: content_key.into(),
            item_type,
            module_id: module_id.into(),
            section_id: section_id.into(),
            front: front.into(),
            back: back.into(),
            source: None,
            metadata: BTreeMap::new(),
            quality_score: None,
            remote_id: None,
            review: ReviewState::default(),
            last_synced_at: None,
            payload_hash: None,
            updated_at,
        }
    }

    /// Whether the item passes the quality gate. A null score never passes.
    pub fn meets_quality(&self, threshold: f64) -> bool {
        matches!(self.quality_score, Some(q) if q >= threshold)
    }

    /// Whether the item has local changes the remote has not seen yet.
    pub fn needs_push(&self, full_sync: bool) -> bool {
        if full_sync || self.remote_id.is_none() {
            return true;
        }
        match self.last_synced_at {
            Some(synced) => self.updated_at > synced,
            None => true,
        }
    }

    /// True when no remote round-trip has happened for this item yet.
    pub fn is_local_only(&self) -> bool {
        self.remote_id.is_none() || self.last_synced_at.is_none()
    }
}

/// Minimum quality score per item type required for push eligibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub default: f64,
    pub per_type: BTreeMap<ItemType, f64>,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        let per_type = BTreeMap::from([
            (ItemType::Flashcard, 0.85),
            (ItemType::Cloze, 0.85),
            (ItemType::Concept, 0.80),
            (ItemType::Question, 0.90),
        ]);
        Self {
            default: 0.85,
            per_type,
        }
    }
}

impl QualityThresholds {
    pub fn threshold_for(&self, item_type: ItemType) -> f64 {
        self.per_type.get(&item_type).copied().unwrap_or(self.default)
    }

    /// Set or replace the threshold for one type.
    pub fn with(mut self, item_type: ItemType, threshold: f64) -> Self {
        self.per_type.insert(item_type, threshold);
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let entries = std::iter::once(("default".to_string(), self.default)).chain(
            self.per_type
                .iter()
                .map(|(ty, value)| (ty.as_str().to_string(), *value)),
        );
        for (item_type, value) in entries {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoreError::InvalidThreshold { item_type, value });
            }
        }
        Ok(())
    }
}

/// Why a section was flagged for remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationReason {
    LowRetrievability,
    HighLapses,
    LowQuizAccuracy,
    Combined,
}

impl RemediationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowRetrievability => "low_retrievability",
            Self::HighLapses => "high_lapses",
            Self::LowQuizAccuracy => "low_quiz_accuracy",
            Self::Combined => "combined",
        }
    }
}

impl FromStr for RemediationReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low_retrievability" => Ok(Self::LowRetrievability),
            "high_lapses" => Ok(Self::HighLapses),
            "low_quiz_accuracy" => Ok(Self::LowQuizAccuracy),
            "combined" => Ok(Self::Combined),
            other => Err(CoreError::UnknownReason(other.to_string())),
        }
    }
}

/// Outcome of scoring one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryResult {
    /// Composite score in [0, 100].
    pub score: f64,
    pub is_mastered: bool,
    pub needs_remediation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RemediationReason>,
    pub priority: u32,
}

/// Where a queue entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueSource {
    Due,
    New,
    Remediation,
}

/// One slot in a study queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyQueueEntry<T> {
    pub item: T,
    pub source: QueueSource,
}

/// Ordered study queue with the counts that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyQueue<T> {
    pub entries: Vec<StudyQueueEntry<T>>,
    pub due_count: usize,
    pub new_count: usize,
    pub remediation_count: usize,
    pub remediation_ratio: f64,
}

impl<T> StudyQueue<T> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
