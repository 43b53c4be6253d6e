//! Sync status snapshot and its one-line rendering.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Current sync stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Connecting,
    Syncing,
    Disconnected,
    Stopped,
}

/// Snapshot of the coordinator. Readers get a copy; the coordinator replaces
/// the whole value on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub running: bool,
    pub connected: bool,
    pub syncing: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_pushed: usize,
    pub last_pulled: usize,
    pub last_error: Option<String>,
    pub cycles: u64,
}

impl SyncStatus {
    /// Short human-readable summary, e.g. `synced 3m ago (↑4 ↓12)`.
    pub fn status_line(&self, now: DateTime<Utc>) -> String {
        if !self.running {
            return "offline".to_string();
        }
        if self.syncing {
            return "syncing...".to_string();
        }
        if !self.connected {
            return "disconnected".to_string();
        }
        match (self.last_run_at, &self.last_error) {
            (None, _) => "syncing...".to_string(),
            (Some(at), Some(_)) => format!("sync failed {}", format_age(now, at)),
            (Some(at), None) => format!(
                "synced {} (↑{} ↓{})",
                format_age(now, at),
                self.last_pushed,
                self.last_pulled
            ),
        }
    }
}

pub fn format_age(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(then).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{}m ago", secs / 60),
        3_600..=86_399 => format!("{}h ago", secs / 3_600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
