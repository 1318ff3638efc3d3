//! Type worker: one per device type per job
//!
//! A worker owns the receiving end of its device type's queue and an
//! exclusive store connection. It moves through three states:
//!
//! ```text
//! RUNNING --(sentinel)--> REPORTING --(stats sent)--> TERMINATED
//! ```
//!
//! Every dequeued line counts as processed; lines that are malformed or that
//! cannot be written also count as errors.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::error::RecordError;
use crate::payload::UserApps;
use crate::record::parse_appsinstalled;
use crate::retry::{write_with_retry, RetryPolicy, WriteOutcome};
use crate::store::Store;

/// Default bounded wait on an empty queue
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Item carried by a worker queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    /// Raw input line, parsed by the worker
    Line(String),
    /// No more input for this job
    Sentinel,
}

/// Per-worker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub errors: u64,
}

/// Stats report sent once by each worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub dev_type: String,
    pub stats: WorkerStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Reporting,
    Terminated,
}

/// Behaviour shared by all workers of a run
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub dry_run: bool,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct TypeWorker {
    dev_type: String,
    queue: mpsc::Receiver<QueueItem>,
    reports: mpsc::Sender<WorkerReport>,
    store: Box<dyn Store>,
    settings: WorkerSettings,
    stats: WorkerStats,
    state: WorkerState,
}

impl TypeWorker {
    pub fn new(
        dev_type: impl Into<String>,
        queue: mpsc::Receiver<QueueItem>,
        reports: mpsc::Sender<WorkerReport>,
        store: Box<dyn Store>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            dev_type: dev_type.into(),
            queue,
            reports,
            store,
            settings,
            stats: WorkerStats::default(),
            state: WorkerState::Running,
        }
    }

    /// Drain the queue until the sentinel, then report once
    pub async fn run(mut self) -> WorkerState {
        while self.state == WorkerState::Running {
            match timeout(self.settings.poll_interval, self.queue.recv()).await {
                Err(_) => trace!(dev_type = %self.dev_type, "Queue idle"),
                Ok(Some(QueueItem::Line(line))) => self.handle_line(&line).await,
                Ok(Some(QueueItem::Sentinel)) => self.state = WorkerState::Reporting,
                Ok(None) => {
                    warn!(dev_type = %self.dev_type, "Queue closed without a sentinel");
                    self.state = WorkerState::Reporting;
                },
            }
        }

        self.report().await;
        self.state
    }

    async fn handle_line(&mut self, line: &str) {
        self.stats.processed += 1;

        if let Err(err) = self.load(line).await {
            self.stats.errors += 1;
            match &err {
                RecordError::StoreWriteFailure { .. } => error!(error = %err, "Store write failed"),
                _ => debug!(error = %err, line, "Record rejected"),
            }
        }
    }

    async fn load(&mut self, line: &str) -> Result<(), RecordError> {
        let record = parse_appsinstalled(line)?;
        let key = record.key();
        let payload = UserApps::from(&record);

        if self.settings.dry_run {
            debug!(addr = self.store.addr(), key = %key, payload = ?payload, "Dry run");
            return Ok(());
        }

        let packed = payload.pack();
        let reason = match write_with_retry(self.store.as_mut(), &key, &packed, &self.settings.retry)
            .await
        {
            WriteOutcome::Stored { .. } => return Ok(()),
            WriteOutcome::Exhausted { attempts } => format!("not stored after {} attempts", attempts),
            WriteOutcome::Raised { error, .. } => error.to_string(),
        };

        Err(RecordError::StoreWriteFailure {
            key,
            addr: self.store.addr().to_string(),
            reason,
        })
    }

    async fn report(&mut self) {
        info!(
            dev_type = %self.dev_type,
            processed = self.stats.processed,
            errors = self.stats.errors,
            "Worker finished"
        );

        let report = WorkerReport {
            dev_type: self.dev_type.clone(),
            stats: self.stats,
        };
        if self.reports.send(report).await.is_err() {
            warn!(dev_type = %self.dev_type, "Stats channel closed, report dropped");
        }
        self.state = WorkerState::Terminated;
    }
}
