#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ferry_core::clock::ManualClock;
use ferry_core::connectivity::ConnectivityMonitor;
use ferry_core::db::SqliteOperationStore;
use ferry_core::dispatch::{DispatchRequest, Transport, TransportError, TransportResponse};
use ferry_core::notify::BroadcastSink;
use ferry_core::{OperationId, QueueConfig, SyncQueue};

pub const START_MS: i64 = 1_700_000_000_000;

/// Answers `failure_status` for the first `failures` attempts (of every
/// operation, or of the whole run) and 200 afterwards. Records every request.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<ScriptState>,
}

#[derive(Default)]
struct ScriptState {
    failures: u32,
    failure_status: u16,
    per_operation: bool,
    attempts: Mutex<HashMap<OperationId, u32>>,
    sent: Mutex<Vec<DispatchRequest>>,
}

impl ScriptedTransport {
    pub fn succeeding() -> Self {
        Self::failing_first(0, 500)
    }

    pub fn failing_first(failures: u32, failure_status: u16) -> Self {
        Self {
            inner: Arc::new(ScriptState {
                failures,
                failure_status,
                per_operation: true,
                ..ScriptState::default()
            }),
        }
    }

    /// Only the first `failures` requests of the run fail.
    pub fn failing_first_requests(failures: u32, failure_status: u16) -> Self {
        Self {
            inner: Arc::new(ScriptState {
                failures,
                failure_status,
                per_operation: false,
                ..ScriptState::default()
            }),
        }
    }

    pub fn sent(&self) -> Vec<DispatchRequest> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub fn sent_ids(&self) -> Vec<OperationId> {
        self.sent()
            .into_iter()
            .map(|request| request.operation_id)
            .collect()
    }

    pub fn attempts_for(&self, id: &OperationId) -> u32 {
        self.inner
            .attempts
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(0)
    }
}

impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: DispatchRequest,
    ) -> Result<TransportResponse, TransportError> {
        let attempt = {
            let mut attempts = self.inner.attempts.lock().unwrap();
            let count = attempts.entry(request.operation_id).or_insert(0);
            *count += 1;
            *count
        };
        let request_number = {
            let mut sent = self.inner.sent.lock().unwrap();
            sent.push(request);
            u32::try_from(sent.len()).unwrap()
        };

        let counted = if self.inner.per_operation {
            attempt
        } else {
            request_number
        };
        let status = if counted <= self.inner.failures {
            self.inner.failure_status
        } else {
            200
        };
        Ok(TransportResponse {
            status,
            body: String::new(),
        })
    }
}

pub struct TestQueue {
    pub queue: SyncQueue<ScriptedTransport>,
    pub transport: ScriptedTransport,
    pub clock: Arc<ManualClock>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub sink: BroadcastSink,
}

pub struct Options {
    pub online: bool,
    pub transport: ScriptedTransport,
    pub clock: Arc<ManualClock>,
    pub config: QueueConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            online: true,
            transport: ScriptedTransport::succeeding(),
            clock: Arc::new(ManualClock::new(START_MS)),
            config: QueueConfig::default(),
        }
    }
}

pub fn in_memory(options: Options) -> TestQueue {
    build(SqliteOperationStore::open_in_memory().unwrap(), options)
}

pub fn on_disk(path: &Path, options: Options) -> TestQueue {
    build(SqliteOperationStore::open(path).unwrap(), options)
}

fn build(store: SqliteOperationStore, options: Options) -> TestQueue {
    let connectivity = Arc::new(ConnectivityMonitor::new(options.online));
    let sink = BroadcastSink::default();
    let queue = SyncQueue::builder(Arc::new(store), options.transport.clone())
        .config(options.config)
        .connectivity(Arc::clone(&connectivity))
        .sink(Arc::new(sink.clone()))
        .clock(options.clock.clone())
        .build()
        .unwrap();

    TestQueue {
        queue,
        transport: options.transport,
        clock: options.clock,
        connectivity,
        sink,
    }
}
