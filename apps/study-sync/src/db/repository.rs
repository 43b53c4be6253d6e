//! Repository pattern for database access.

use crate::db::date_utils::{parse_db_timestamp, to_db_timestamp};
use crate::db::error::DbError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use study_core::types::{ItemType, LearningItem, MasteryResult, Rating, RemediationReason, ReviewState, ReviewStatus};

type Result<T> = std::result::Result<T, DbError>;

/// Repository for learning item operations.
pub trait ItemRepository {
    /// Insert or update an item's content. The scheduling mirror and sync
    /// bookkeeping of an existing row are left untouched.
    fn upsert_item(&self, item: &LearningItem) -> Result<()>;
    fn get_item(&self, content_key: &str) -> Result<Option<LearningItem>>;
    fn list_items(&self) -> Result<Vec<LearningItem>>;
    /// Items of one section. Sections are only unique within their module.
    fn list_items_in_section(&self, module_id: &str, section_id: &str) -> Result<Vec<LearningItem>>;
    /// Distinct (module_id, section_id) pairs.
    fn list_sections(&self) -> Result<Vec<(String, String)>>;
    fn save_review_state(&self, content_key: &str, state: &ReviewState) -> Result<()>;
}

/// Item successfully written to the remote scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct PushedItem {
    pub content_key: String,
    pub remote_id: i64,
    pub payload_hash: String,
    /// `updated_at` of the content that was sent.
    pub content_updated_at: DateTime<Utc>,
}

/// Remote scheduling state mapped onto a local item.
#[derive(Debug, Clone, PartialEq)]
pub struct PulledState {
    pub content_key: String,
    pub remote_id: i64,
    pub state: ReviewState,
    pub queue_state: String,
}

/// Result of applying pulled states.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullApplied {
    pub updated: usize,
    /// Content keys with no local row.
    pub unmatched: Vec<String>,
}

/// Local sync state.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct LocalSyncState {
    pub last_push_at: Option<DateTime<Utc>>,
    pub last_pull_at: Option<DateTime<Utc>>,
}

/// Repository for sync operations.
pub trait SyncRepository {
    /// Items with changes the remote has not seen, or every item for a full sync.
    fn list_push_candidates(&self, full_sync: bool) -> Result<Vec<LearningItem>>;
    /// Record remote ids and payload hashes in one transaction.
    ///
    /// Rows edited since their content was sent only get the remote id, so
    /// they stay eligible for the next push.
    fn mark_pushed(&self, pushed: &[PushedItem], synced_at: DateTime<Utc>) -> Result<()>;
    /// Overwrite scheduling mirrors in one transaction. Nothing is applied on error.
    fn apply_pulled_states(&self, states: &[PulledState], synced_at: DateTime<Utc>) -> Result<PullApplied>;
    fn get_sync_state(&self) -> Result<LocalSyncState>;
}

/// Logged review interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewLogEntry {
    pub content_key: String,
    pub reviewed_at: DateTime<Utc>,
    pub rating: Rating,
    pub interval_before: f64,
    pub interval_after: f64,
    pub ease_before: f64,
    pub ease_after: f64,
    /// Local scheduler name when the fallback was applied.
    pub scheduler: Option<String>,
    pub applied_locally: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizAttempt {
    pub module_id: String,
    pub section_id: String,
    pub content_key: Option<String>,
    pub correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// Stored mastery evaluation for one section.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SectionMastery {
    pub section_id: String,
    pub module_id: String,
    pub evaluated_at: DateTime<Utc>,
    pub result: MasteryResult,
}

/// Repository for study history and mastery.
pub trait StudyRepository {
    fn insert_review_log(&self, entry: &ReviewLogEntry) -> Result<i64>;
    fn count_review_log(&self, content_key: &str) -> Result<usize>;
    fn insert_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<i64>;
    /// Percentage of correct answers, or None with no attempts.
    fn quiz_accuracy(&self, module_id: &str, section_id: &str) -> Result<Option<f64>>;
    fn save_section_mastery(&self, mastery: &SectionMastery) -> Result<()>;
    /// Most recent evaluation per (module, section).
    fn latest_section_mastery(&self) -> Result<Vec<SectionMastery>>;
}

const ITEM_COLUMNS: &str = "content_key, item_type, module_id, section_id, front, back, source, metadata,
    quality_score, remote_id, status, interval_days, ease_factor, stability, difficulty,
    retrievability, review_count, lapses, due_date, last_synced_at, payload_hash, updated_at";

/// SQLite implementation of repositories.
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Open database at path, creating if necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbError::InvalidData(format!("cannot create {}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    /// Open in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.busy_timeout(std::time::Duration::from_secs(5))?;
        self.conn.execute_batch(super::schema::SCHEMA)?;
        self.conn.execute_batch(super::schema::INIT_SYNC_STATE)?;
        self.conn.execute_batch(super::schema::INIT_SCHEMA_VERSION)?;
        Ok(())
    }

    fn query_items(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<LearningItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM learning_items {filter} ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(args, Self::row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<LearningItem> {
        let item_type: String = row.get(1)?;
        let item_type = item_type
            .parse::<ItemType>()
            .map_err(|e| conversion_error(1, e))?;
        let metadata: String = row.get(7)?;
        let metadata = serde_json::from_str(&metadata).map_err(|e| conversion_error(7, e))?;
        let updated_raw: String = row.get(21)?;
        let updated_at = parse_db_timestamp(&updated_raw).ok_or_else(|| {
            conversion_error(21, DbError::InvalidData(format!("bad timestamp: {updated_raw}")))
        })?;
        let status: String = row.get(10)?;

        Ok(LearningItem {
            content_key: row.get(0)?,
            item_type,
            module_id: row.get(2)?,
            section_id: row.get(3)?,
            front: row.get(4)?,
            back: row.get(5)?,
            source: row.get(6)?,
            metadata,
            quality_score: row.get(8)?,
            remote_id: row.get(9)?,
            review: ReviewState {
                status: ReviewStatus::parse(&status),
                interval_days: row.get(11)?,
                ease_factor: row.get(12)?,
                stability: row.get(13)?,
                difficulty: row.get(14)?,
                retrievability: row.get(15)?,
                review_count: row.get(16)?,
                lapses: row.get(17)?,
                due_date: row
                    .get::<_, Option<String>>(18)?
                    .and_then(|s| parse_db_timestamp(&s)),
            },
            last_synced_at: row
                .get::<_, Option<String>>(19)?
                .and_then(|s| parse_db_timestamp(&s)),
            payload_hash: row.get(20)?,
            updated_at,
        })
    }
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

impl ItemRepository for SqliteRepository {
    fn upsert_item(&self, item: &LearningItem) -> Result<()> {
        let metadata = serde_json::to_string(&item.metadata)
            .map_err(|e| DbError::InvalidData(format!("metadata for {}: {e}", item.content_key)))?;
        self.conn.execute(
            "INSERT INTO learning_items (content_key, item_type, module_id, section_id, front, back,
                source, metadata, quality_score, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(content_key) DO UPDATE SET
                item_type = excluded.item_type,
                module_id = excluded.module_id,
                section_id = excluded.section_id,
                front = excluded.front,
                back = excluded.back,
                source = excluded.source,
                metadata = excluded.metadata,
                quality_score = excluded.quality_score,
                updated_at = excluded.updated_at",
            params![
                item.content_key,
                item.item_type.as_str(),
                item.module_id,
                item.section_id,
                item.front,
                item.back,
                item.source,
                metadata,
                item.quality_score,
                to_db_timestamp(&item.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_item(&self, content_key: &str) -> Result<Option<LearningItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM learning_items WHERE content_key = ?1");
        self.conn
            .query_row(&sql, params![content_key], Self::row_to_item)
            .optional()
            .map_err(Into::into)
    }

    fn list_items(&self) -> Result<Vec<LearningItem>> {
        self.query_items("", &[])
    }

    fn list_items_in_section(&self, module_id: &str, section_id: &str) -> Result<Vec<LearningItem>> {
        self.query_items(
            "WHERE module_id = ?1 AND section_id = ?2",
            &[&module_id, &section_id],
        )
    }

    fn list_sections(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT module_id, section_id FROM learning_items ORDER BY module_id, section_id",
        )?;
        let sections = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sections)
    }

    fn save_review_state(&self, content_key: &str, state: &ReviewState) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE learning_items SET status = ?2, interval_days = ?3, ease_factor = ?4,
                stability = ?5, difficulty = ?6, retrievability = ?7, review_count = ?8,
                lapses = ?9, due_date = ?10
             WHERE content_key = ?1",
            params![
                content_key,
                state.status.as_str(),
                state.interval_days,
                state.ease_factor,
                state.stability,
                state.difficulty,
                state.retrievability,
                state.review_count,
                state.lapses,
                state.due_date.as_ref().map(to_db_timestamp),
            ],
        )?;
        if changed == 0 {
            return Err(DbError::ItemNotFound(content_key.to_string()));
        }
        Ok(())
    }
}

impl SyncRepository for SqliteRepository {
    fn list_push_candidates(&self, full_sync: bool) -> Result<Vec<LearningItem>> {
        Ok(self
            .list_items()?
            .into_iter()
            .filter(|item| item.needs_push(full_sync))
            .collect())
    }

    fn mark_pushed(&self, pushed: &[PushedItem], synced_at: DateTime<Utc>) -> Result<()> {
        if pushed.is_empty() {
            return Ok(());
        }
        let synced = to_db_timestamp(&synced_at);
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE learning_items SET remote_id = ?2,
                    payload_hash = CASE WHEN updated_at = ?5 THEN ?3 ELSE payload_hash END,
                    last_synced_at = CASE WHEN updated_at = ?5 THEN ?4 ELSE last_synced_at END
                 WHERE content_key = ?1",
            )?;
            for item in pushed {
                stmt.execute(params![
                    item.content_key,
                    item.remote_id,
                    item.payload_hash,
                    synced,
                    to_db_timestamp(&item.content_updated_at),
                ])?;
            }
        }
        tx.execute(
            "UPDATE sync_state SET last_push_at = ?1 WHERE id = 1",
            params![synced],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn apply_pulled_states(&self, states: &[PulledState], synced_at: DateTime<Utc>) -> Result<PullApplied> {
        let synced = to_db_timestamp(&synced_at);
        let mut applied = PullApplied::default();
        let tx = self.conn.unchecked_transaction()?;
        {
            // last_synced_at only advances when no local edit is pending, so a
            // pull never hides content the remote has not received.
            let mut stmt = tx.prepare(
                "UPDATE learning_items SET remote_id = ?2, status = ?3, interval_days = ?4,
                    ease_factor = ?5, stability = ?6, difficulty = ?7, retrievability = ?8,
                    review_count = ?9, lapses = ?10, due_date = ?11, queue_state = ?12,
                    last_synced_at = CASE
                        WHEN last_synced_at IS NOT NULL AND updated_at <= last_synced_at THEN ?13
                        ELSE last_synced_at
                    END
                 WHERE content_key = ?1",
            )?;
            for pulled in states {
                let state = &pulled.state;
                let changed = stmt.execute(params![
                    pulled.content_key,
                    pulled.remote_id,
                    state.status.as_str(),
                    state.interval_days,
                    state.ease_factor,
                    state.stability,
                    state.difficulty,
                    state.retrievability,
                    state.review_count,
                    state.lapses,
                    state.due_date.as_ref().map(to_db_timestamp),
                    pulled.queue_state,
                    synced,
                ])?;
                if changed == 0 {
                    applied.unmatched.push(pulled.content_key.clone());
                } else {
                    applied.updated += 1;
                }
            }
        }
        tx.execute(
            "UPDATE sync_state SET last_pull_at = ?1 WHERE id = 1",
            params![synced],
        )?;
        tx.commit()?;
        Ok(applied)
    }

    fn get_sync_state(&self) -> Result<LocalSyncState> {
        self.conn
            .query_row(
                "SELECT last_push_at, last_pull_at FROM sync_state WHERE id = 1",
                [],
                |row| {
                    Ok(LocalSyncState {
                        last_push_at: row
                            .get::<_, Option<String>>(0)?
                            .and_then(|s| parse_db_timestamp(&s)),
                        last_pull_at: row
                            .get::<_, Option<String>>(1)?
                            .and_then(|s| parse_db_timestamp(&s)),
                    })
                },
            )
            .map_err(Into::into)
    }
}

impl StudyRepository for SqliteRepository {
    fn insert_review_log(&self, entry: &ReviewLogEntry) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO review_log (content_key, reviewed_at, rating, interval_before, interval_after,
                ease_before, ease_after, scheduler, applied_locally)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.content_key,
                to_db_timestamp(&entry.reviewed_at),
                entry.rating.to_value(),
                entry.interval_before,
                entry.interval_after,
                entry.ease_before,
                entry.ease_after,
                entry.scheduler,
                entry.applied_locally,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn count_review_log(&self, content_key: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM review_log WHERE content_key = ?1",
            params![content_key],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn insert_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO quiz_attempts (module_id, section_id, content_key, correct, answered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                attempt.module_id,
                attempt.section_id,
                attempt.content_key,
                attempt.correct,
                to_db_timestamp(&attempt.answered_at),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn quiz_accuracy(&self, module_id: &str, section_id: &str) -> Result<Option<f64>> {
        let (total, correct): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(correct), 0) FROM quiz_attempts
             WHERE module_id = ?1 AND section_id = ?2",
            params![module_id, section_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if total == 0 {
            return Ok(None);
        }
        Ok(Some(correct as f64 / total as f64 * 100.0))
    }

    fn save_section_mastery(&self, mastery: &SectionMastery) -> Result<()> {
        let result = &mastery.result;
        self.conn.execute(
            "INSERT INTO section_mastery (section_id, module_id, evaluated_at, score, is_mastered,
                needs_remediation, reason, priority)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                mastery.section_id,
                mastery.module_id,
                to_db_timestamp(&mastery.evaluated_at),
                result.score,
                result.is_mastered,
                result.needs_remediation,
                result.reason.map(|r| r.as_str()),
                result.priority,
            ],
        )?;
        Ok(())
    }

    fn latest_section_mastery(&self) -> Result<Vec<SectionMastery>> {
        let mut stmt = self.conn.prepare(
            "SELECT section_id, module_id, evaluated_at, score, is_mastered, needs_remediation,
                    reason, priority
             FROM section_mastery m
             WHERE id = (
                SELECT id FROM section_mastery
                WHERE module_id = m.module_id AND section_id = m.section_id
                ORDER BY evaluated_at DESC, id DESC LIMIT 1
             )
             ORDER BY module_id, section_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let evaluated_raw: String = row.get(2)?;
                let evaluated_at = parse_db_timestamp(&evaluated_raw).ok_or_else(|| {
                    conversion_error(2, DbError::InvalidData(format!("bad timestamp: {evaluated_raw}")))
                })?;
                let reason = row
                    .get::<_, Option<String>>(6)?
                    .map(|r| r.parse::<RemediationReason>())
                    .transpose()
                    .map_err(|e| conversion_error(6, e))?;
                Ok(SectionMastery {
                    section_id: row.get(0)?,
                    module_id: row.get(1)?,
                    evaluated_at,
                    result: MasteryResult {
                        score: row.get(3)?,
                        is_mastered: row.get(4)?,
                        needs_remediation: row.get(5)?,
                        reason,
                        priority: row.get(7)?,
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
