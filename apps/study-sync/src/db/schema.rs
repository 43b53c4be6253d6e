//! SQLite schema definitions.

/// Current schema version for migrations.
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema for the local store.
pub const SCHEMA: &str = r#"
-- Learning items with their scheduling mirror
CREATE TABLE IF NOT EXISTS learning_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_key TEXT NOT NULL UNIQUE,
    item_type TEXT NOT NULL,
    module_id TEXT NOT NULL,
    section_id TEXT NOT NULL,
    front TEXT NOT NULL,
    back TEXT NOT NULL,
    source TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    quality_score REAL,
    remote_id INTEGER,
    status TEXT NOT NULL DEFAULT 'new',
    interval_days REAL NOT NULL DEFAULT 0,
    ease_factor REAL NOT NULL DEFAULT 2.5,
    stability REAL,
    difficulty REAL,
    retrievability REAL,
    review_count INTEGER NOT NULL DEFAULT 0,
    lapses INTEGER NOT NULL DEFAULT 0,
    due_date TEXT,
    queue_state TEXT,
    last_synced_at TEXT,
    payload_hash TEXT,
    updated_at TEXT NOT NULL
);

-- Local review interactions
CREATE TABLE IF NOT EXISTS review_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_key TEXT NOT NULL REFERENCES learning_items(content_key),
    reviewed_at TEXT NOT NULL,
    rating INTEGER NOT NULL,
    interval_before REAL NOT NULL,
    interval_after REAL NOT NULL,
    ease_before REAL NOT NULL,
    ease_after REAL NOT NULL,
    scheduler TEXT,
    applied_locally INTEGER NOT NULL DEFAULT 0
);

-- Quiz answers feeding section accuracy
CREATE TABLE IF NOT EXISTS quiz_attempts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    module_id TEXT NOT NULL,
    section_id TEXT NOT NULL,
    content_key TEXT,
    correct INTEGER NOT NULL,
    answered_at TEXT NOT NULL
);

-- Section mastery evaluations
CREATE TABLE IF NOT EXISTS section_mastery (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    section_id TEXT NOT NULL,
    module_id TEXT NOT NULL,
    evaluated_at TEXT NOT NULL,
    score REAL NOT NULL,
    is_mastered INTEGER NOT NULL,
    needs_remediation INTEGER NOT NULL,
    reason TEXT,
    priority INTEGER NOT NULL DEFAULT 0
);

-- Sync metadata
CREATE TABLE IF NOT EXISTS sync_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_push_at TEXT,
    last_pull_at TEXT
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_items_section ON learning_items(module_id, section_id);
CREATE INDEX IF NOT EXISTS idx_items_remote ON learning_items(remote_id);
CREATE INDEX IF NOT EXISTS idx_items_due ON learning_items(due_date);
CREATE INDEX IF NOT EXISTS idx_review_log_key ON review_log(content_key);
CREATE INDEX IF NOT EXISTS idx_quiz_section ON quiz_attempts(module_id, section_id);
CREATE INDEX IF NOT EXISTS idx_mastery_section ON section_mastery(module_id, section_id, evaluated_at);
"#;

/// Initialize sync state if not exists.
pub const INIT_SYNC_STATE: &str = r#"
INSERT OR IGNORE INTO sync_state (id) VALUES (1);
"#;

/// Record the schema version if not exists.
pub const INIT_SCHEMA_VERSION: &str = r#"
INSERT OR IGNORE INTO schema_version (version) VALUES (1);
"#;
