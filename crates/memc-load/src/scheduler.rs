//! Job scheduler
//!
//! Discovers input files, keeps up to `workers` jobs running at all times,
//! and consumes their results in sorted submission order. Each job that read
//! its whole input has its file renamed with a leading dot, whatever its
//! error-rate verdict. Files whose job failed, lost a worker, or was
//! interrupted keep their name and are picked up again by the next run.

use anyhow::Context;
use futures::stream::{self, StreamExt};
use globset::GlobBuilder;
use memc_common::{MemcError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::LoaderConfig;
use crate::job::{run_job, Job, JobContext, JobReport};
use crate::stats::Verdict;
use crate::store::StoreConnector;

/// Prefix marking a file as loaded
pub const COMPLETION_MARKER: char = '.';

/// Counters for one scheduler run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Files matching the pattern
    pub files: usize,
    /// Jobs that read their whole input
    pub loaded: usize,
    /// Loaded files with an error rate at or above the threshold
    pub high_error_rate: usize,
    /// Loaded files that were renamed
    pub renamed: usize,
    /// Jobs that failed, panicked, or were interrupted
    pub failed: usize,
    /// Files never started because of a shutdown request
    pub skipped: usize,
}

impl RunSummary {
    fn record(&mut self, report: &JobReport) {
        self.loaded += 1;
        if matches!(report.verdict, Verdict::Failed { .. }) {
            self.high_error_rate += 1;
        }
    }
}

pub struct JobScheduler {
    config: LoaderConfig,
    connector: Arc<dyn StoreConnector>,
    shutdown: CancellationToken,
}

impl JobScheduler {
    pub fn new(
        config: LoaderConfig,
        connector: Arc<dyn StoreConnector>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            shutdown,
        })
    }

    /// Process every file matching the configured pattern
    pub async fn run(&self) -> anyhow::Result<RunSummary> {
        let files = discover_files(&self.config.pattern)
            .with_context(|| format!("Failed to discover files for {}", self.config.pattern))?;
        info!(
            pattern = %self.config.pattern,
            count = files.len(),
            "Discovered input files"
        );

        let mut summary = RunSummary {
            files: files.len(),
            ..RunSummary::default()
        };

        let device_memc = Arc::new(self.config.device_memc.clone());
        let ctx = JobContext::new(&self.config, self.connector.clone(), self.shutdown.clone())?;
        let dry_run = self.config.dry_run;
        let shutdown = self.shutdown.clone();

        // Jobs finish in any order; a free slot starts the next file at once
        let mut finished = stream::iter(files.into_iter().enumerate())
            .take_while(move |_| future::ready(!shutdown.is_cancelled()))
            .map(|(index, path)| {
                let job = Job {
                    path: path.clone(),
                    device_memc: device_memc.clone(),
                    dry_run,
                };
                let handle = tokio::spawn(run_job(job, ctx.clone()));
                async move { (index, path, handle.await) }
            })
            .buffer_unordered(self.config.workers);

        // Results are consumed in submission order
        let mut pending = BTreeMap::new();
        let mut started = 0;
        while let Some((index, path, result)) = finished.next().await {
            pending.insert(index, (path, result));
            while let Some((path, result)) = pending.remove(&started) {
                started += 1;
                self.complete(&path, result, &mut summary).await;
            }
        }
        summary.skipped = summary.files - started;

        if summary.skipped > 0 {
            warn!(skipped = summary.skipped, "Shutdown requested, remaining files left in place");
        }
        info!(
            files = summary.files,
            loaded = summary.loaded,
            renamed = summary.renamed,
            high_error_rate = summary.high_error_rate,
            failed = summary.failed,
            skipped = summary.skipped,
            "Run finished"
        );

        Ok(summary)
    }

    async fn complete(
        &self,
        path: &Path,
        result: std::result::Result<anyhow::Result<JobReport>, JoinError>,
        summary: &mut RunSummary,
    ) {
        match result {
            Ok(Ok(report)) => {
                summary.record(&report);
                match dot_rename(path).await {
                    Ok(renamed) => {
                        summary.renamed += 1;
                        info!(from = %path.display(), to = %renamed.display(), "Renamed");
                    },
                    Err(e) => error!(file = %path.display(), "Failed to rename: {}", e),
                }
            },
            Ok(Err(e)) => {
                summary.failed += 1;
                error!(file = %path.display(), "Job failed: {:#}", e);
            },
            Err(e) => {
                summary.failed += 1;
                error!(file = %path.display(), "Job task failed: {}", e);
            },
        }
    }
}

/// Rename `path` to the same name with a leading [`COMPLETION_MARKER`]
pub async fn dot_rename(path: &Path) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;

    let mut marked = std::ffi::OsString::from(COMPLETION_MARKER.to_string());
    marked.push(name);
    let target = path.with_file_name(marked);

    tokio::fs::rename(path, &target).await?;
    Ok(target)
}

/// Find regular files matching `pattern`, sorted by path
///
/// Hidden entries (leading dot) are never returned, so files that already
/// carry the completion marker are not loaded twice.
pub fn discover_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| MemcError::Pattern {
            pattern: pattern.to_string(),
            reason: e.kind().to_string(),
        })?
        .compile_matcher();

    let (base, depth) = split_pattern(pattern);
    let root = if base.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        base.clone()
    };
    if !root.exists() {
        debug!(root = %root.display(), "Pattern base does not exist");
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(&root).follow_links(true);
    if let Some(depth) = depth {
        walker = walker.max_depth(depth);
    }

    let mut files = Vec::new();
    for entry in walker
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            },
        };
        if !entry.file_type().is_file() || is_hidden(entry.path()) {
            continue;
        }

        let candidate = if base.as_os_str().is_empty() {
            entry.path().strip_prefix(".").unwrap_or(entry.path())
        } else {
            entry.path()
        };
        if matcher.is_match(candidate) {
            files.push(candidate.to_path_buf());
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Literal directory prefix of a pattern and, when the pattern has no `**`,
/// how many levels below it the walk must descend
fn split_pattern(pattern: &str) -> (PathBuf, Option<usize>) {
    let path = Path::new(pattern);
    let mut base = PathBuf::new();
    let mut rest = Vec::new();

    for component in path.components() {
        let text = component.as_os_str().to_string_lossy();
        if rest.is_empty() && !is_glob(&text) {
            base.push(component);
        } else {
            rest.push(component);
        }
    }

    // A fully literal pattern names a file: walk from its parent
    if rest.is_empty() {
        if let Some(last) = path.components().next_back() {
            if matches!(last, Component::Normal(_)) {
                base.pop();
                rest.push(last);
            }
        }
    }

    let recursive = rest
        .iter()
        .any(|c| c.as_os_str().to_string_lossy().contains("**"));
    let depth = (!recursive).then_some(rest.len());
    (base, depth)
}

fn is_glob(text: &str) -> bool {
    text.contains(['*', '?', '[', '{'])
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(COMPLETION_MARKER))
}
