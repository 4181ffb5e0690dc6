//! Pass scheduling and per-operation state transitions

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;

use crate::backoff::BackoffPolicy;
use crate::clock::Clock;
use crate::config::QueueConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::db::{OperationStore, PassRecord, RecoveryReport};
use crate::dispatch::{DispatchOutcome, Dispatcher, Transport};
use crate::error::Result;
use crate::models::{OperationStatus, SyncOperation};
use crate::notify::{NotificationSink, SyncEvent};
use crate::util::duration_millis;

/// Runtime-adjustable timing for the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub backoff: BackoffPolicy,
    pub in_flight_grace: Duration,
    pub retention: Duration,
    /// `None` disables the periodic timer
    pub sync_interval: Option<Duration>,
}

impl SyncSettings {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            backoff: config.backoff_policy(),
            in_flight_grace: config.in_flight_grace(),
            retention: config.retention(),
            sync_interval: config
                .enable_periodic_sync
                .then(|| config.sync_interval()),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// Counts from one finished pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub started_at: i64,
    pub finished_at: i64,
    pub succeeded: usize,
    pub retried: usize,
    pub failed: usize,
    /// Cancelled while in flight and dropped after their attempt
    pub dropped: usize,
    /// Connectivity was lost before every candidate was tried
    pub interrupted: bool,
}

impl PassReport {
    pub const fn attempted(&self) -> usize {
        self.succeeded + self.retried + self.failed + self.dropped
    }
}

/// What a pass request turned into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum PassOutcome {
    Completed(PassReport),
    /// Another pass was running; this request was coalesced into it
    AlreadyRunning,
    Offline,
    /// The store failed; nothing was lost and the next trigger retries
    Aborted { reason: String },
}

/// Clears the single-flight flag when the pass ends, however it ends.
struct PassGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drains ready operations through the dispatcher, one pass at a time.
pub struct SyncCoordinator<T> {
    store: Arc<dyn OperationStore>,
    dispatcher: Dispatcher<T>,
    connectivity: Arc<ConnectivityMonitor>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    settings: RwLock<SyncSettings>,
    running: AtomicBool,
}

impl<T: Transport> SyncCoordinator<T> {
    pub fn new(
        store: Arc<dyn OperationStore>,
        dispatcher: Dispatcher<T>,
        connectivity: Arc<ConnectivityMonitor>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            dispatcher,
            connectivity,
            sink,
            clock,
            settings: RwLock::new(settings),
            running: AtomicBool::new(false),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub const fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    pub fn settings(&self) -> SyncSettings {
        self.settings
            .read()
            .map(|settings| settings.clone())
            .unwrap_or_default()
    }

    pub fn update_settings(&self, settings: SyncSettings) {
        if let Ok(mut current) = self.settings.write() {
            *current = settings;
        }
    }

    /// Run one drain-and-dispatch pass.
    ///
    /// Never fails: store errors abort the pass and are reported in the outcome.
    pub async fn run_pass(&self) -> PassOutcome {
        if !self.connectivity.is_online() {
            tracing::debug!("Skipping sync pass while offline");
            return PassOutcome::Offline;
        }
        let Some(_guard) = PassGuard::acquire(&self.running) else {
            tracing::debug!("Sync pass already running; request coalesced");
            return PassOutcome::AlreadyRunning;
        };

        let started_at = self.clock.now_ms();
        let report = match self.drain(started_at).await {
            Ok(report) => report,
            Err(error) => {
                tracing::warn!("Sync pass aborted: {error}");
                return PassOutcome::Aborted {
                    reason: error.to_string(),
                };
            }
        };

        if report.attempted() > 0 {
            tracing::info!(
                "Sync pass finished: {} succeeded, {} retrying, {} failed",
                report.succeeded,
                report.retried,
                report.failed
            );
            self.sink.publish(&SyncEvent::PassCompleted {
                succeeded: report.succeeded,
                retried: report.retried,
                failed: report.failed,
            });
        }

        let record = PassRecord {
            started_at: report.started_at,
            finished_at: report.finished_at,
            succeeded: report.succeeded,
            retried: report.retried,
            failed: report.failed,
        };
        if let Err(error) = self.store.record_pass(&record) {
            tracing::warn!("Failed to record sync pass: {error}");
        }

        PassOutcome::Completed(report)
    }

    async fn drain(&self, started_at: i64) -> Result<PassReport> {
        let candidates = self.store.list_pending(started_at, None)?;
        let mut report = PassReport {
            started_at,
            ..PassReport::default()
        };

        for candidate in candidates {
            if !self.connectivity.is_online() {
                tracing::info!("Went offline mid-pass; remaining operations wait");
                report.interrupted = true;
                break;
            }

            let claimed_at = self.clock.now_ms();
            if !self.store.mark_in_flight(&candidate.id, claimed_at)? {
                // Cancelled or claimed elsewhere since the listing
                continue;
            }
            let operation = SyncOperation {
                attempts: candidate.attempts + 1,
                updated_at: claimed_at,
                status: OperationStatus::InFlight,
                ..candidate
            };

            let outcome = self.dispatcher.dispatch(&operation).await;
            self.apply(&operation, outcome, &mut report)?;
        }

        report.finished_at = self.clock.now_ms();
        Ok(report)
    }

    fn apply(
        &self,
        operation: &SyncOperation,
        outcome: DispatchOutcome,
        report: &mut PassReport,
    ) -> Result<()> {
        let now = self.clock.now_ms();
        match outcome {
            DispatchOutcome::Success => {
                if self.store.mark_completed(&operation.id, now)? {
                    tracing::debug!("Synced {} ({})", operation.id, operation.kind);
                    report.succeeded += 1;
                    self.sink.publish(&SyncEvent::Synced {
                        id: operation.id,
                        kind: operation.kind,
                    });
                }
            }
            DispatchOutcome::Retryable(reason) if operation.attempts_exhausted() => {
                let reason = format!(
                    "{reason} (gave up after {} attempts)",
                    operation.attempts
                );
                self.fail_permanently(operation, &reason, now, report)?;
            }
            DispatchOutcome::Retryable(reason) => {
                let delay = self.settings().backoff.delay_millis(operation.attempts);
                let next_eligible_at = now.saturating_add(delay);
                if self
                    .store
                    .mark_failed_retry(&operation.id, next_eligible_at, &reason, now)?
                {
                    tracing::warn!(
                        "Attempt {}/{} for {} ({}) failed: {reason}; retrying in {delay} ms",
                        operation.attempts,
                        operation.max_attempts,
                        operation.id,
                        operation.kind
                    );
                    report.retried += 1;
                } else {
                    report.dropped += 1;
                }
            }
            DispatchOutcome::Fatal(reason) => {
                self.fail_permanently(operation, &reason, now, report)?;
            }
        }
        Ok(())
    }

    fn fail_permanently(
        &self,
        operation: &SyncOperation,
        reason: &str,
        now: i64,
        report: &mut PassReport,
    ) -> Result<()> {
        if !self
            .store
            .mark_permanently_failed(&operation.id, reason, now)?
        {
            report.dropped += 1;
            return Ok(());
        }

        tracing::error!(
            "Operation {} ({}) permanently failed: {reason}",
            operation.id,
            operation.kind
        );
        report.failed += 1;
        self.publish_failure(operation, reason);
        Ok(())
    }

    fn publish_failure(&self, operation: &SyncOperation, reason: &str) {
        self.sink.publish(&SyncEvent::PermanentlyFailed {
            id: operation.id,
            kind: operation.kind,
            summary: operation.summary(),
            reason: reason.to_string(),
        });
    }

    /// Return stale in-flight claims to pending.
    ///
    /// Claims younger than the grace window are left alone. The
    /// interrupted attempt is not counted against the operation.
    pub fn reconcile(&self) -> Result<RecoveryReport> {
        let now = self.clock.now_ms();
        let grace = duration_millis(self.settings().in_flight_grace);
        let report = self
            .store
            .recover_in_flight(now.saturating_sub(grace), now)?;

        if !report.requeued.is_empty() || report.dropped > 0 {
            tracing::info!(
                "Recovered {} interrupted operations ({} cancelled)",
                report.requeued.len(),
                report.dropped
            );
        }
        Ok(report)
    }

    /// Delete terminal records older than the retention window.
    pub fn purge_expired(&self) -> Result<usize> {
        let retention = duration_millis(self.settings().retention);
        self.purge_older_than(retention)
    }

    /// Delete terminal records last touched more than `age_ms` ago.
    pub fn purge_older_than(&self, age_ms: i64) -> Result<usize> {
        let horizon = self.clock.now_ms().saturating_sub(age_ms);
        let purged = self.store.purge_terminal(horizon)?;
        if purged > 0 {
            tracing::info!("Purged {purged} finished operations");
        }
        Ok(purged)
    }

    /// Periodic upkeep: recover stale claims, then purge old records.
    ///
    /// Skipped while a pass is running so a live claim is never recovered.
    pub fn maintain(&self) -> Result<()> {
        let Some(_guard) = PassGuard::acquire(&self.running) else {
            return Ok(());
        };
        self.reconcile()?;
        self.purge_expired()?;
        Ok(())
    }
}
