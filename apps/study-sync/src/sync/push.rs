//! Push: local items to remote notes.
//!
//! Eligible items (changed since the last sync and above their type's
//! quality threshold) are grouped by partition, classified as create or
//! update, and written in fixed-size batches. Each successful batch is
//! committed locally before the next one is sent.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::Serialize;
use study_core::LearningItem;
use tracing::{debug, info, warn};

use super::payload::{deck_name, identity_query, NotePayload};
use super::{Aborted, ItemError, SyncError};
use crate::config::SyncConfig;
use crate::db::{PushedItem, SharedRepository, SqliteRepository, SyncRepository};
use crate::remote::{RemoteClient, RemoteError, RemoteOutcome, Request};

/// Push statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PushReport {
    pub created: usize,
    pub updated: usize,
    /// Below the quality threshold, or unchanged since the last push.
    pub skipped: usize,
    /// Touched locally but with a payload identical to the last push.
    pub unchanged: usize,
    pub partitions_created: usize,
    pub errors: Vec<ItemError>,
}

impl PushReport {
    pub fn pushed(&self) -> usize {
        self.created + self.updated
    }
}

type PushResult<T> = Result<T, Aborted<PushReport>>;

struct Prepared {
    item: LearningItem,
    payload: NotePayload,
    hash: String,
}

#[derive(Clone)]
pub struct PushSynchronizer {
    client: RemoteClient,
    repository: SharedRepository,
    config: SyncConfig,
}

impl PushSynchronizer {
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

    /// Push changed items, or every eligible item when `full_sync` is set.
    pub async fn run(&self, full_sync: bool) -> PushResult<PushReport> {
        let mut report = PushReport::default();

        let probe = self.client.probe().await;
        if !probe.is_connected() {
            return Err(Aborted::new(SyncError::Unreachable(probe.describe()), report));
        }

        let candidates = match self.with_repo(|repo| repo.list_push_candidates(full_sync)) {
            Ok(items) => items,
            Err(e) => return Err(Aborted::new(e, report)),
        };

        let (eligible, rejected): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|item| {
            item.meets_quality(self.config.thresholds.threshold_for(item.item_type))
        });
        report.skipped += rejected.len();
        if eligible.is_empty() {
            debug!(skipped = report.skipped, "nothing to push");
            return Ok(report);
        }

        let failed_decks = self.ensure_partitions(&eligible, &mut report).await?;
        let mut ready = Vec::with_capacity(eligible.len());
        for item in eligible {
            let deck = deck_name(&item, &self.config);
            if failed_decks.contains(&deck) {
                report
                    .errors
                    .push(ItemError::new(&item.content_key, format!("partition {deck} unavailable")));
            } else {
                ready.push(item);
            }
        }

        let (creates, updates) = self.classify(ready, full_sync, &mut report).await?;

        let batch_size = self.config.batch_size.max(1);
        for chunk in creates.chunks(batch_size) {
            self.push_creates(chunk, &mut report).await?;
        }
        for chunk in updates.chunks(batch_size) {
            self.push_updates(chunk, &mut report).await?;
        }

        info!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            unchanged = report.unchanged,
            partitions = report.partitions_created,
            errors = report.errors.len(),
            "push complete"
        );
        Ok(report)
    }

    /// Create missing partitions. Returns the ones that could not be created.
    async fn ensure_partitions(
        &self,
        items: &[LearningItem],
        report: &mut PushReport,
    ) -> PushResult<BTreeSet<String>> {
        let wanted: BTreeSet<String> = items
            .iter()
            .map(|item| deck_name(item, &self.config))
            .collect();

        let existing: Vec<String> = match self.client.call_as(&Request::DeckNames).await {
            Ok(names) => names,
            Err(e) => return Err(Aborted::new(e, report.clone())),
        };
        let existing: BTreeSet<String> = existing.into_iter().collect();
        let missing: Vec<String> = wanted.difference(&existing).cloned().collect();
        if missing.is_empty() {
            return Ok(BTreeSet::new());
        }

        let requests: Vec<Request> = missing
            .iter()
            .map(|deck| Request::CreateDeck { deck: deck.clone() })
            .collect();
        let outcomes = match self.client.call_batch(&requests).await {
            Ok(outcomes) => outcomes,
            Err(e) => return Err(Aborted::new(e, report.clone())),
        };

        let mut failed = BTreeSet::new();
        for (deck, outcome) in missing.into_iter().zip(outcomes) {
            match outcome {
                RemoteOutcome::Ok(_) => {
                    debug!(%deck, "created partition");
                    report.partitions_created += 1;
                }
                RemoteOutcome::Err(message) if message.to_lowercase().contains("already exists") => {}
                RemoteOutcome::Err(message) => {
                    warn!(%deck, %message, "failed to create partition");
                    failed.insert(deck);
                }
            }
        }
        Ok(failed)
    }

    /// Split items into creates and updates. Items without a known remote id
    /// are probed by identity first, so a lost id never produces a duplicate.
    async fn classify(
        &self,
        items: Vec<LearningItem>,
        full_sync: bool,
        report: &mut PushReport,
    ) -> PushResult<(Vec<Prepared>, Vec<Prepared>)> {
        let prepare = |item: LearningItem| {
            let payload = NotePayload::build(&item, &self.config);
            let hash = payload.hash();
            Prepared { item, payload, hash }
        };

        let (known, unknown): (Vec<_>, Vec<_>) =
            items.into_iter().partition(|item| item.remote_id.is_some());

        let mut creates = Vec::new();
        let mut updates = Vec::new();
        let mut unchanged = Vec::new();
        for item in known {
            let prepared = prepare(item);
            if !full_sync && prepared.item.payload_hash.as_deref() == Some(prepared.hash.as_str()) {
                unchanged.push(prepared);
            } else {
                updates.push(prepared);
            }
        }

        for chunk in unknown.chunks(self.config.batch_size.max(1)) {
            let requests: Vec<Request> = chunk
                .iter()
                .map(|item| Request::FindNotes {
                    query: identity_query(&item.content_key, &self.config),
                })
                .collect();
            let outcomes = match self.client.call_batch(&requests).await {
                Ok(outcomes) => outcomes,
                Err(e) if e.is_connectivity() => return Err(Aborted::new(e, report.clone())),
                Err(e) => {
                    record_batch_failure(report, chunk.iter().map(|i| i.content_key.as_str()), &e);
                    continue;
                }
            };

            for (item, outcome) in chunk.iter().zip(outcomes) {
                match outcome.decode::<Vec<i64>>() {
                    Ok(ids) => match ids.iter().min() {
                        Some(&id) => {
                            if ids.len() > 1 {
                                warn!(key = %item.content_key, count = ids.len(), "several remote notes share one identity");
                            }
                            let mut item = item.clone();
                            item.remote_id = Some(id);
                            updates.push(prepare(item));
                        }
                        None => creates.push(prepare(item.clone())),
                    },
                    Err(e) => report.errors.push(ItemError::new(&item.content_key, e)),
                }
            }
        }

        if !unchanged.is_empty() {
            let settled: Vec<PushedItem> = unchanged.iter().map(pushed_item).collect();
            let now = Utc::now();
            if let Err(e) = self.with_repo(|repo| repo.mark_pushed(&settled, now)) {
                return Err(Aborted::new(SyncError::Commit(e), report.clone()));
            }
            report.unchanged += settled.len();
            report.skipped += settled.len();
        }

        Ok((creates, updates))
    }

    async fn push_creates(&self, chunk: &[Prepared], report: &mut PushReport) -> PushResult<()> {
        let requests: Vec<Request> = chunk
            .iter()
            .map(|p| Request::AddNote {
                note: p.payload.to_new_note(&self.config.note_model),
            })
            .collect();
        let Some(outcomes) = self.send_batch(chunk, &requests, report).await? else {
            return Ok(());
        };

        let mut succeeded = Vec::new();
        for (prepared, outcome) in chunk.iter().zip(outcomes) {
            match outcome.decode::<Option<i64>>() {
                Ok(Some(id)) => succeeded.push(PushedItem {
                    content_key: prepared.item.content_key.clone(),
                    remote_id: id,
                    payload_hash: prepared.hash.clone(),
                    content_updated_at: prepared.item.updated_at,
                }),
                Ok(None) => report.errors.push(ItemError::new(
                    &prepared.item.content_key,
                    "remote returned no note id",
                )),
                Err(e) => report.errors.push(ItemError::new(&prepared.item.content_key, e)),
            }
        }

        self.commit(&succeeded, report)?;
        report.created += succeeded.len();
        Ok(())
    }

    async fn push_updates(&self, chunk: &[Prepared], report: &mut PushReport) -> PushResult<()> {
        let mut requests = Vec::with_capacity(chunk.len());
        for prepared in chunk {
            // Classification only puts items with a remote id here.
            let id = prepared.item.remote_id.unwrap_or_default();
            requests.push(Request::UpdateNote {
                note: prepared.payload.to_update(id),
            });
        }
        let Some(outcomes) = self.send_batch(chunk, &requests, report).await? else {
            return Ok(());
        };

        let mut succeeded = Vec::new();
        for (prepared, outcome) in chunk.iter().zip(outcomes) {
            match outcome {
                RemoteOutcome::Ok(_) => succeeded.push(pushed_item(prepared)),
                RemoteOutcome::Err(message) => report
                    .errors
                    .push(ItemError::new(&prepared.item.content_key, message)),
            }
        }

        self.commit(&succeeded, report)?;
        report.updated += succeeded.len();
        Ok(())
    }

    /// Send one write batch. A non-connectivity failure of the whole batch
    /// is recorded against each item and yields `None`.
    async fn send_batch(
        &self,
        chunk: &[Prepared],
        requests: &[Request],
        report: &mut PushReport,
    ) -> PushResult<Option<Vec<RemoteOutcome>>> {
        match self.client.call_batch(requests).await {
            Ok(outcomes) => Ok(Some(outcomes)),
            Err(e) if e.is_connectivity() => Err(Aborted::new(e, report.clone())),
            Err(e) => {
                record_batch_failure(report, chunk.iter().map(|p| p.item.content_key.as_str()), &e);
                Ok(None)
            }
        }
    }

    fn commit(&self, succeeded: &[PushedItem], report: &PushReport) -> PushResult<()> {
        let now = Utc::now();
        self.with_repo(|repo| repo.mark_pushed(succeeded, now))
            .map_err(|e| Aborted::new(SyncError::Commit(e), report.clone()))
    }
}

fn pushed_item(prepared: &Prepared) -> PushedItem {
    PushedItem {
        content_key: prepared.item.content_key.clone(),
        remote_id: prepared.item.remote_id.unwrap_or_default(),
        payload_hash: prepared.hash.clone(),
        content_updated_at: prepared.item.updated_at,
    }
}

fn record_batch_failure<'a>(
    report: &mut PushReport,
    keys: impl Iterator<Item = &'a str>,
    error: &RemoteError,
) {
    warn!(%error, "batch failed");
    report
        .errors
        .extend(keys.map(|key| ItemError::new(key, error)));
}
