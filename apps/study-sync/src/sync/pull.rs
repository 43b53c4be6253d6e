//! Pull: remote scheduling state into the local mirror.
//!
//! The remote is authoritative for scheduling. Cards are matched to local
//! items by the identity field, never by remote id, and every mapped state
//! is written in a single transaction.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use study_core::algorithm::retention::{current_retrievability, difficulty_from_ease, stability_from_interval};
use study_core::ReviewState;
use tracing::{debug, info};

use super::payload::default_scope;
use super::{Aborted, SyncError};
use crate::config::SyncConfig;
use crate::db::{PulledState, SharedRepository, SqliteRepository, SyncRepository};
use crate::remote::codes::{self, CardType, Queue};
use crate::remote::{CardInfo, RemoteClient, Request};

/// Ease assumed when the remote reports none, as for unseen cards.
///
/// A `factor` of 0 would give 0.0 under the plain `factor / 1000` rule; unseen
/// cards get the remote's starting ease instead.
const DEFAULT_EASE: f64 = 2.5;

/// Pull statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PullReport {
    /// Card records received.
    pub fetched: usize,
    /// Local items whose mirror was overwritten.
    pub updated: usize,
    /// Records without a usable identity.
    pub unmapped: usize,
    /// Identities with no local item.
    pub unmatched: usize,
}

type PullResult<T> = Result<T, Aborted<PullReport>>;

#[derive(Clone)]
pub struct PullSynchronizer {
    client: RemoteClient,
    repository: SharedRepository,
    config: SyncConfig,
}

impl PullSynchronizer {
    pub fn new(client: RemoteClient, repository: SharedRepository, config: SyncConfig) -> Self {
        Self {
            client,
            repository,
            config,
        }
    }

    fn with_repo<T>(&self, f: impl FnOnce(&SqliteRepository) -> T) -> T {
        let repo = self.repository.lock().expect("repository lock");
        f(&repo)
    }

    /// Pull every card in the configured scope.
    pub async fn run(&self) -> PullResult<PullReport> {
        let mut report = PullReport::default();

        let probe = self.client.probe().await;
        if !probe.is_connected() {
            return Err(Aborted::new(SyncError::Unreachable(probe.describe()), report));
        }

        let scope = self
            .config
            .pull_scope
            .clone()
            .unwrap_or_else(|| default_scope(&self.config));
        let card_ids: Vec<i64> = match self.client.call_as(&Request::FindCards { query: scope }).await {
            Ok(ids) => ids,
            Err(e) => return Err(Aborted::new(e, report)),
        };

        let epoch = self.client.config().collection_epoch;
        let now = Utc::now();
        let mut seen = HashSet::new();
        let mut states = Vec::new();

        for chunk in card_ids.chunks(self.config.batch_size.max(1)) {
            let request = Request::CardsInfo {
                cards: chunk.to_vec(),
            };
            let entries: Vec<Value> = match self.client.call_as(&request).await {
                Ok(entries) => entries,
                Err(e) => return Err(Aborted::new(e, report)),
            };
            report.fetched += entries.len();

            for entry in entries {
                let mapped = serde_json::from_value::<CardInfo>(entry)
                    .map_err(|e| e.to_string())
                    .and_then(|card| map_card(&card, &self.config, epoch, now));
                match mapped {
                    Ok(state) => {
                        // One card per note is enough; the first wins.
                        if seen.insert(state.content_key.clone()) {
                            states.push(state);
                        }
                    }
                    Err(reason) => {
                        debug!(%reason, "unmapped card");
                        report.unmapped += 1;
                    }
                }
            }
        }

        let applied = match self.with_repo(|repo| repo.apply_pulled_states(&states, now)) {
            Ok(applied) => applied,
            Err(e) => return Err(Aborted::new(SyncError::Commit(e), report)),
        };
        report.updated = applied.updated;
        report.unmatched = applied.unmatched.len();
        if !applied.unmatched.is_empty() {
            debug!(keys = ?applied.unmatched, "remote identities without local items");
        }

        info!(
            fetched = report.fetched,
            updated = report.updated,
            unmapped = report.unmapped,
            unmatched = report.unmatched,
            "pull complete"
        );
        Ok(report)
    }
}

/// Translate one remote card into a local scheduling state.
pub fn map_card(
    card: &CardInfo,
    config: &SyncConfig,
    collection_epoch: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<PulledState, String> {
    let content_key = codes::field_value(&card.fields, &config.fields.identity)
        .ok_or_else(|| format!("card {} has no {} field", card.card_id, config.fields.identity))?
        .to_string();

    let queue = Queue::from_code(card.queue);
    let card_type = CardType::from_code(card.card_type);
    let interval_days = codes::interval_days(card.interval);
    let ease_factor = codes::ease_from_factor(card.factor).unwrap_or(DEFAULT_EASE);

    let mut state = ReviewState {
        status: codes::review_status(queue, card_type),
        interval_days,
        ease_factor,
        stability: Some(stability_from_interval(interval_days)),
        difficulty: Some(difficulty_from_ease(ease_factor)),
        retrievability: None,
        review_count: card.reps,
        lapses: card.lapses,
        due_date: codes::due_date(
            codes::classify_due(queue, card_type, card.due),
            collection_epoch,
        )
        .map_err(|e| format!("card {}: {e}", card.card_id))?,
    };
    state.retrievability = current_retrievability(&state, now);

    Ok(PulledState {
        content_key,
        remote_id: card.note,
        state,
        queue_state: queue.as_str().to_string(),
    })
}
