//! One file-processing job
//!
//! A job wires one dispatcher to one [`TypeWorker`] per configured device
//! type, waits until every worker has reported, and then logs the error-rate
//! verdict. Jobs share nothing with each other beyond the read-only
//! configuration.

use anyhow::{bail, Context};
use memc_common::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument, Span};

use crate::config::LoaderConfig;
use crate::dispatcher::Dispatcher;
use crate::stats::{StatsAggregator, Verdict};
use crate::store::StoreConnector;
use crate::worker::{TypeWorker, WorkerSettings, WorkerStats};

/// One input file plus the device type mapping it is loaded with
#[derive(Debug, Clone)]
pub struct Job {
    pub path: PathBuf,
    pub device_memc: Arc<BTreeMap<String, String>>,
    pub dry_run: bool,
}

/// Run-wide settings shared by every job
#[derive(Clone)]
pub struct JobContext {
    connector: Arc<dyn StoreConnector>,
    shutdown: CancellationToken,
    queue_capacity: usize,
    error_threshold: f64,
    settings: WorkerSettings,
}

impl JobContext {
    /// Validates `config`, so jobs never see a zero-capacity queue
    pub fn new(
        config: &LoaderConfig,
        connector: Arc<dyn StoreConnector>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            connector,
            shutdown,
            queue_capacity: config.queue_capacity,
            error_threshold: config.error_threshold,
            settings: config.worker_settings(),
        })
    }
}

/// Outcome of a job that read its whole input
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub path: PathBuf,
    pub totals: WorkerStats,
    pub verdict: Verdict,
}

/// Load one file
///
/// Returns an error if the file cannot be opened or read, or if the run was
/// interrupted before the file was exhausted. Per-record failures are counted
/// in the report and never fail the job.
pub async fn run_job(job: Job, ctx: JobContext) -> anyhow::Result<JobReport> {
    let span = info_span!("job", file = %job.path.display());
    execute(job, ctx).instrument(span).await
}

async fn execute(job: Job, ctx: JobContext) -> anyhow::Result<JobReport> {
    info!("Processing {}", job.path.display());

    let lines = memc_common::compression::open_lines(&job.path)
        .with_context(|| format!("Failed to open {}", job.path.display()))?;

    let worker_count = job.device_memc.len();
    let (stats_tx, mut stats_rx) = mpsc::channel(worker_count.max(1));
    let settings = WorkerSettings {
        dry_run: job.dry_run,
        ..ctx.settings.clone()
    };

    let mut queues = BTreeMap::new();
    let mut workers = Vec::with_capacity(worker_count);
    for (dev_type, addr) in job.device_memc.iter() {
        let (tx, rx) = mpsc::channel(ctx.queue_capacity);
        queues.insert(dev_type.clone(), tx);

        let worker = TypeWorker::new(
            dev_type.clone(),
            rx,
            stats_tx.clone(),
            ctx.connector.connect(addr),
            settings.clone(),
        );
        let span = info_span!("worker", dev_type = %dev_type, addr = %addr);
        workers.push(tokio::spawn(worker.run().instrument(span)));
    }
    drop(stats_tx);

    let dispatcher = Dispatcher::new(queues, ctx.shutdown.clone());
    let span = Span::current();
    let dispatched =
        tokio::task::spawn_blocking(move || span.in_scope(|| dispatcher.dispatch(lines))).await;

    let mut lost_workers = 0;
    for worker in workers {
        if let Err(e) = worker.await {
            error!("Worker task failed: {}", e);
            lost_workers += 1;
        }
    }

    let mut aggregator = StatsAggregator::new();
    while let Some(report) = stats_rx.recv().await {
        aggregator.add_report(&report);
    }
    // Lines held by a lost worker were never written, so the file is not done
    if lost_workers > 0 || aggregator.reports() != worker_count {
        bail!(
            "Worker reports incomplete for {} ({} of {} received)",
            job.path.display(),
            aggregator.reports(),
            worker_count
        );
    }

    let dispatch = dispatched
        .context("Dispatcher task failed")?
        .with_context(|| format!("Failed to read {}", job.path.display()))?;
    if dispatch.interrupted {
        bail!("Interrupted before {} was fully read", job.path.display());
    }

    aggregator.add(dispatch.as_worker_stats());
    let verdict = aggregator.verdict(ctx.error_threshold);
    verdict.log(&job.path);

    Ok(JobReport {
        path: job.path,
        totals: aggregator.totals(),
        verdict,
    })
}
