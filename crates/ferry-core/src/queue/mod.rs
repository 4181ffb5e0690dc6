//! The queue facade used by application code

mod helpers;

pub use helpers::{RosterAction, TradeDecision};

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::config::QueueConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::db::{CancelOutcome, OperationStore, RecoveryReport, SqliteOperationStore, StoreStats};
use crate::dispatch::{Dispatcher, EndpointResolver, HttpTransport, StaticEndpointResolver, Transport};
use crate::error::{Error, Result};
use crate::models::{OperationId, OperationKind, OperationStatus, SyncOperation};
use crate::notify::{NotificationSink, SyncEvent, TracingSink};
use crate::sync::{self, BackgroundWake, PassOutcome, SyncCoordinator, SyncHandle, SyncSettings};
use crate::util::{duration_millis, normalize_text_option};

/// Per-enqueue options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Overrides the kind's priority weight
    pub priority: Option<i32>,
    /// Correlation key, e.g. a league id
    pub scope: Option<String>,
    /// Request a pass right away when online
    pub immediate: bool,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: None,
            scope: None,
            immediate: true,
        }
    }
}

impl EnqueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Leave delivery to the next timer or connectivity trigger.
    #[must_use]
    pub const fn deferred(mut self) -> Self {
        self.immediate = false;
        self
    }
}

/// Snapshot for status indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub in_flight: usize,
    /// Permanently failed operations not yet purged
    pub failed: usize,
    pub online: bool,
    pub syncing: bool,
    /// When the last pass finished (Unix ms)
    pub last_sync_at: Option<i64>,
}

/// Assembles a `SyncQueue` from its collaborators.
pub struct SyncQueueBuilder<T> {
    store: Arc<dyn OperationStore>,
    transport: T,
    config: QueueConfig,
    resolver: Option<Arc<dyn EndpointResolver>>,
    connectivity: Option<Arc<ConnectivityMonitor>>,
    sink: Option<Arc<dyn NotificationSink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl<T: Transport> SyncQueueBuilder<T> {
    #[must_use]
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to the standard route table under `config.api_base_url`.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn EndpointResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Defaults to a monitor that starts online.
    #[must_use]
    pub fn connectivity(mut self, connectivity: Arc<ConnectivityMonitor>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Defaults to `TracingSink`.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration, then reconcile interrupted claims and
    /// purge expired records before handing back the queue.
    pub fn build(self) -> Result<SyncQueue<T>> {
        self.config.validate()?;

        let resolver = self.resolver.unwrap_or_else(|| {
            Arc::new(StaticEndpointResolver::with_defaults(
                &self.config.api_base_url,
            ))
        });
        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(ConnectivityMonitor::default()));
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let dispatcher = Dispatcher::new(
            self.transport,
            Arc::clone(&resolver),
            Arc::clone(&connectivity),
            self.config.dispatch_timeout(),
        );
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::clone(&self.store),
            dispatcher,
            Arc::clone(&connectivity),
            Arc::clone(&sink),
            Arc::clone(&clock),
            SyncSettings::from_config(&self.config),
        ));

        coordinator.reconcile()?;
        coordinator.purge_expired()?;

        Ok(SyncQueue {
            store: self.store,
            coordinator,
            resolver,
            connectivity,
            sink,
            clock,
            config: RwLock::new(self.config),
        })
    }
}

/// Durable offline queue with background delivery.
///
/// One instance per application; share it by reference or `Arc`.
pub struct SyncQueue<T = HttpTransport> {
    store: Arc<dyn OperationStore>,
    coordinator: Arc<SyncCoordinator<T>>,
    resolver: Arc<dyn EndpointResolver>,
    connectivity: Arc<ConnectivityMonitor>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    config: RwLock<QueueConfig>,
}

impl SyncQueue<HttpTransport> {
    /// Open the queue file at `path` and deliver over HTTP.
    pub fn open(path: impl AsRef<Path>, config: QueueConfig) -> Result<Self> {
        let store = SqliteOperationStore::open(path)?;
        let transport = HttpTransport::new(config.auth_token.clone())?;
        Self::builder(Arc::new(store), transport).config(config).build()
    }
}

impl<T: Transport> SyncQueue<T> {
    pub fn builder(store: Arc<dyn OperationStore>, transport: T) -> SyncQueueBuilder<T> {
        SyncQueueBuilder {
            store,
            transport,
            config: QueueConfig::default(),
            resolver: None,
            connectivity: None,
            sink: None,
            clock: None,
        }
    }

    /// Durably record an operation and return its id.
    ///
    /// Returns once the write is durable; delivery happens later. Fails
    /// synchronously only when the kind has no usable endpoint or the store
    /// cannot be written.
    pub fn enqueue(
        &self,
        kind: OperationKind,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<OperationId> {
        let endpoint = self.resolver.resolve(kind).ok_or_else(|| {
            Error::Configuration(format!("no endpoint registered for {kind}"))
        })?;
        let scope = normalize_text_option(options.scope);
        endpoint.render(scope.as_deref())?;

        let (max_attempts, priority) = {
            let config = self.config();
            (
                config.max_attempts,
                options
                    .priority
                    .unwrap_or_else(|| config.priority_for(kind)),
            )
        };

        let mut operation =
            SyncOperation::new(kind, payload, max_attempts, self.clock.now_ms())
                .with_priority(priority);
        operation.scope = scope;
        self.store.put(&operation)?;
        tracing::debug!(
            "Queued {} {} (priority {priority})",
            operation.kind,
            operation.id
        );

        if !self.connectivity.is_online() {
            self.sink.publish(&SyncEvent::SavedOffline {
                id: operation.id,
                kind,
                message: kind.offline_message().to_string(),
            });
        } else if options.immediate {
            self.request_pass();
        }

        Ok(operation.id)
    }

    /// Start a pass in the background without waiting for it.
    ///
    /// Returns `false` when there is no tokio runtime to run it on; the
    /// operation then waits for the next trigger.
    pub fn request_pass(&self) -> bool {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let coordinator = Arc::clone(&self.coordinator);
                handle.spawn(async move {
                    coordinator.run_pass().await;
                });
                true
            }
            Err(_) => {
                tracing::debug!("No async runtime; pass deferred to the next trigger");
                false
            }
        }
    }

    pub fn status(&self) -> Result<QueueStatus> {
        let stats = self.store.stats()?;
        Ok(QueueStatus {
            pending: stats.pending,
            in_flight: stats.in_flight,
            failed: stats.permanently_failed,
            online: self.connectivity.is_online(),
            syncing: self.coordinator.is_syncing(),
            last_sync_at: self.store.last_pass_at()?,
        })
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }

    /// Run a pass now. A no-op when offline or when one is already running.
    pub async fn flush(&self) -> PassOutcome {
        self.coordinator.run_pass().await
    }

    /// Drop every non-terminal operation in `scope`.
    ///
    /// In-flight operations finish their current attempt first.
    pub fn cancel(&self, scope: &str) -> Result<CancelOutcome> {
        let scope = scope.trim();
        if scope.is_empty() {
            return Err(Error::InvalidInput("scope must not be empty".to_string()));
        }
        let outcome = self.store.cancel(Some(scope))?;
        tracing::info!(
            "Cancelled scope {scope}: {} removed, {} after current attempt",
            outcome.removed,
            outcome.deferred
        );
        Ok(outcome)
    }

    /// Drop every non-terminal operation.
    pub fn clear(&self) -> Result<CancelOutcome> {
        let outcome = self.store.cancel(None)?;
        tracing::info!(
            "Cleared queue: {} removed, {} after current attempt",
            outcome.removed,
            outcome.deferred
        );
        Ok(outcome)
    }

    /// Delete finished records last touched more than `older_than` ago.
    pub fn purge(&self, older_than: Duration) -> Result<usize> {
        self.coordinator.purge_older_than(duration_millis(older_than))
    }

    /// Return stale in-flight claims to pending.
    pub fn recover(&self) -> Result<RecoveryReport> {
        self.coordinator.reconcile()
    }

    pub fn get(&self, id: &OperationId) -> Result<Option<SyncOperation>> {
        self.store.get(id)
    }

    pub fn list(&self, status: Option<OperationStatus>, limit: usize) -> Result<Vec<SyncOperation>> {
        self.store.list(status, limit)
    }

    /// Delete a finished operation, e.g. after the user dismisses its failure.
    pub fn discard(&self, id: &OperationId) -> Result<()> {
        let operation = self.require(id)?;
        if !operation.status.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "operation {id} is {}; cancel its scope instead",
                operation.status
            )));
        }
        self.store.delete(id)?;
        Ok(())
    }

    /// Queue a fresh copy of a permanently failed operation.
    ///
    /// The failed record is replaced; the copy gets a new id and a full
    /// attempt budget.
    pub fn retry(&self, id: &OperationId) -> Result<OperationId> {
        let failed = self.require(id)?;
        if failed.status != OperationStatus::PermanentlyFailed {
            return Err(Error::InvalidInput(format!(
                "operation {id} is {}; only permanently failed operations can be retried",
                failed.status
            )));
        }

        let mut options = EnqueueOptions::new().priority(failed.priority);
        options.scope = failed.scope;
        let retried = self.enqueue(failed.kind, failed.payload, options)?;
        self.store.delete(id)?;
        tracing::info!("Retrying {id} as {retried}");
        Ok(retried)
    }

    fn require(&self, id: &OperationId) -> Result<SyncOperation> {
        self.store
            .get(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn config(&self) -> QueueConfig {
        self.config
            .read()
            .map(|config| config.clone())
            .unwrap_or_default()
    }

    /// Swap retry policy and timing at runtime.
    ///
    /// `max_attempts` applies to operations enqueued from now on. The base
    /// URL and token are fixed for the life of the queue.
    pub fn update_config(&self, config: QueueConfig) -> Result<()> {
        config.validate()?;
        self.coordinator
            .update_settings(SyncSettings::from_config(&config));
        self.coordinator
            .dispatcher()
            .set_timeout(config.dispatch_timeout());
        if let Ok(mut current) = self.config.write() {
            *current = config;
        }
        tracing::info!("Queue configuration updated");
        Ok(())
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub fn is_syncing(&self) -> bool {
        self.coordinator.is_syncing()
    }

    /// Spawn the background trigger loop. Must be called inside a tokio runtime.
    pub fn start(&self, wake: Option<BackgroundWake>) -> SyncHandle {
        sync::spawn(Arc::clone(&self.coordinator), wake)
    }
}
