//! Background sync coordinator.
//!
//! Runs push then pull on a fixed interval while the remote is reachable.
//! At most one cycle runs at a time, whether started by the timer or by
//! [`CoordinatorHandle::trigger`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::pull::PullSynchronizer;
use super::push::PushSynchronizer;
use super::status::{SyncPhase, SyncStatus};
use crate::config::SyncConfig;
use crate::db::SharedRepository;
use crate::remote::RemoteClient;

/// What one cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed {
        pushed: usize,
        pulled: usize,
        error: Option<String>,
    },
    /// The remote was not reachable; nothing was attempted.
    Disconnected,
    /// Another cycle was already running.
    Skipped,
    /// The coordinator is not running.
    NotRunning,
}

struct Shared {
    client: RemoteClient,
    pusher: PushSynchronizer,
    puller: PullSynchronizer,
    full_sync: bool,
    interval: Duration,
    in_flight: AtomicBool,
    status: watch::Sender<SyncStatus>,
}

/// Resets the in-flight flag however the cycle ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    fn update(&self, f: impl FnOnce(&mut SyncStatus)) {
        self.status.send_modify(f);
    }

    async fn run_cycle(&self) -> CycleOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sync cycle already running, skipping");
            return CycleOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);

        let probe = self.client.probe().await;
        if !probe.is_connected() {
            info!(probe = %probe.describe(), "remote not reachable, skipping cycle");
            self.update(|s| {
                s.connected = false;
                if s.running {
                    s.phase = SyncPhase::Disconnected;
                }
            });
            return CycleOutcome::Disconnected;
        }

        self.update(|s| {
            s.connected = true;
            s.syncing = true;
            s.phase = SyncPhase::Syncing;
        });

        let mut errors = Vec::new();
        let pushed = match self.pusher.run(self.full_sync).await {
            Ok(report) => report.pushed(),
            Err(aborted) => {
                error!(error = %aborted.error, "push aborted");
                errors.push(format!("push: {}", aborted.error));
                aborted.partial.pushed()
            }
        };
        // Pull runs even when push failed.
        let pulled = match self.puller.run().await {
            Ok(report) => report.updated,
            Err(aborted) => {
                error!(error = %aborted.error, "pull aborted");
                errors.push(format!("pull: {}", aborted.error));
                aborted.partial.updated
            }
        };

        let error = (!errors.is_empty()).then(|| errors.join("; "));
        let finished_at = Utc::now();
        let last_error = error.clone();
        self.update(move |s| {
            s.syncing = false;
            if s.running {
                s.phase = SyncPhase::Idle;
            }
            s.last_run_at = Some(finished_at);
            s.last_pushed = pushed;
            s.last_pulled = pulled;
            s.last_error = last_error;
            s.cycles += 1;
        });
        info!(pushed, pulled, failed = error.is_some(), "sync cycle finished");

        CycleOutcome::Completed {
            pushed,
            pulled,
            error,
        }
    }
}

/// Factory for running coordinators.
pub struct SyncCoordinator;

impl SyncCoordinator {
    /// Probe the remote and, when reachable, spawn the periodic worker.
    ///
    /// When the remote is unreachable the handle comes back not running:
    /// `status_line()` reads "offline" and no worker exists.
    pub async fn start(
        client: RemoteClient,
        repository: SharedRepository,
        config: SyncConfig,
    ) -> CoordinatorHandle {
        let (status_tx, _) = watch::channel(SyncStatus {
            phase: SyncPhase::Connecting,
            ..Default::default()
        });
        let (stop_tx, stop_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            pusher: PushSynchronizer::new(client.clone(), repository.clone(), config.clone()),
            puller: PullSynchronizer::new(client.clone(), repository, config.clone()),
            client,
            full_sync: config.full_sync,
            interval: config.interval(),
            in_flight: AtomicBool::new(false),
            status: status_tx,
        });

        let probe = shared
            .client
            .probe_with_timeout(config.start_probe_timeout())
            .await;
        if !probe.is_connected() {
            warn!(probe = %probe.describe(), "remote scheduler unavailable, sync disabled");
            shared.update(|s| {
                s.phase = SyncPhase::Stopped;
                s.running = false;
                s.connected = false;
            });
            return CoordinatorHandle {
                shared,
                stop_tx,
                worker: None,
                stop_timeout: config.stop_timeout(),
            };
        }

        shared.update(|s| {
            s.phase = SyncPhase::Idle;
            s.running = true;
            s.connected = true;
        });
        info!(interval_secs = config.interval_secs, "sync coordinator started");

        let worker = tokio::spawn(run_loop(shared.clone(), stop_rx));
        CoordinatorHandle {
            shared,
            stop_tx,
            worker: Some(worker),
            stop_timeout: config.stop_timeout(),
        }
    }
}

async fn run_loop(shared: Arc<Shared>, mut stop_rx: watch::Receiver<bool>) {
    loop {
        let stopped = *stop_rx.borrow();
        if stopped {
            break;
        }
        shared.run_cycle().await;

        tokio::select! {
            _ = tokio::time::sleep(shared.interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    // Handle dropped without stop().
                    break;
                }
            }
        }
    }
    debug!("sync worker exited");
}

/// Control handle for a started coordinator.
pub struct CoordinatorHandle {
    shared: Arc<Shared>,
    stop_tx: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
    stop_timeout: Duration,
}

impl CoordinatorHandle {
    pub fn is_running(&self) -> bool {
        self.shared.status.borrow().running
    }

    /// Copy of the current status.
    pub fn status(&self) -> SyncStatus {
        self.shared.status.borrow().clone()
    }

    pub fn status_line(&self) -> String {
        self.status().status_line(Utc::now())
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    /// Run one cycle now, unless one is already in flight.
    pub async fn trigger(&self) -> CycleOutcome {
        if !self.is_running() {
            return CycleOutcome::NotRunning;
        }
        self.shared.run_cycle().await
    }

    /// Signal the worker and wait for it up to the stop timeout. A worker
    /// still busy after that is aborted; the handle reports stopped either way.
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(mut worker) = self.worker.take() {
            match tokio::time::timeout(self.stop_timeout, &mut worker).await {
                Ok(Ok(())) => debug!("sync worker joined"),
                Ok(Err(e)) => warn!(error = %e, "sync worker failed"),
                Err(_) => {
                    warn!(
                        timeout_ms = self.stop_timeout.as_millis() as u64,
                        "sync worker did not stop in time, aborting"
                    );
                    worker.abort();
                }
            }
        }
        self.shared.update(|s| {
            s.running = false;
            s.syncing = false;
            s.phase = SyncPhase::Stopped;
        });
        info!("sync coordinator stopped");
    }
}
