//! Per-job statistics and the error-rate verdict
//!
//! The verdict is informational: it is logged, and it never decides whether
//! the input file receives its completion marker.

use serde::Serialize;
use std::path::Path;
use tracing::{error, info};

use crate::worker::{WorkerReport, WorkerStats};

/// Default maximum acceptable error rate (exclusive)
pub const DEFAULT_ERROR_THRESHOLD: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Nothing was processed, no rate computed
    Empty,
    Accepted { error_rate: f64 },
    Failed { error_rate: f64, threshold: f64 },
}

impl Verdict {
    pub fn log(&self, file: &Path) {
        match *self {
            Verdict::Empty => info!(file = %file.display(), "No records processed"),
            Verdict::Accepted { error_rate } => info!(
                file = %file.display(),
                error_rate,
                "Acceptable error rate ({}). Successful load",
                error_rate
            ),
            Verdict::Failed {
                error_rate,
                threshold,
            } => error!(
                file = %file.display(),
                error_rate,
                threshold,
                "High error rate ({} > {}). Failed load",
                error_rate,
                threshold
            ),
        }
    }
}

/// Sums worker reports and dispatch-time counters for one job
#[derive(Debug, Default)]
pub struct StatsAggregator {
    totals: WorkerStats,
    reports: usize,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker's final report
    pub fn add_report(&mut self, report: &WorkerReport) {
        self.reports += 1;
        self.add(report.stats);
    }

    /// Add counters that did not come from a worker (e.g. unknown types)
    pub fn add(&mut self, stats: WorkerStats) {
        self.totals.processed += stats.processed;
        self.totals.errors += stats.errors;
    }

    /// Number of worker reports received
    pub fn reports(&self) -> usize {
        self.reports
    }

    pub fn totals(&self) -> WorkerStats {
        self.totals
    }

    /// Decide whether the job's error rate is acceptable
    pub fn verdict(&self, threshold: f64) -> Verdict {
        if self.totals.processed == 0 {
            return Verdict::Empty;
        }

        let error_rate = self.totals.errors as f64 / self.totals.processed as f64;
        if error_rate < threshold {
            Verdict::Accepted { error_rate }
        } else {
            Verdict::Failed {
                error_rate,
                threshold,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(processed: u64, errors: u64) -> WorkerReport {
        WorkerReport {
            dev_type: "idfa".to_string(),
            stats: WorkerStats { processed, errors },
        }
    }

    #[test]
    fn test_empty_job_has_no_rate() {
        let mut aggregator = StatsAggregator::new();
        aggregator.add_report(&report(0, 0));
        assert_eq!(aggregator.verdict(DEFAULT_ERROR_THRESHOLD), Verdict::Empty);
    }

    #[test]
    fn test_sums_reports_and_dispatch_counts() {
        let mut aggregator = StatsAggregator::new();
        aggregator.add_report(&report(3, 0));
        aggregator.add_report(&report(3, 0));
        aggregator.add_report(&report(3, 0));
        aggregator.add_report(&report(3, 0));
        aggregator.add(WorkerStats {
            processed: 1,
            errors: 1,
        });

        assert_eq!(aggregator.reports(), 4);
        assert_eq!(
            aggregator.totals(),
            WorkerStats {
                processed: 13,
                errors: 1
            }
        );
        match aggregator.verdict(DEFAULT_ERROR_THRESHOLD) {
            Verdict::Failed { error_rate, .. } => assert!((error_rate - 1.0 / 13.0).abs() < 1e-12),
            other => panic!("expected failed verdict, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_equal_to_threshold_fails() {
        let mut aggregator = StatsAggregator::new();
        aggregator.add_report(&report(100, 1));
        assert!(matches!(aggregator.verdict(0.01), Verdict::Failed { .. }));
    }

    #[test]
    fn test_rate_below_threshold_is_accepted() {
        let mut aggregator = StatsAggregator::new();
        aggregator.add_report(&report(1000, 9));
        assert!(matches!(aggregator.verdict(0.01), Verdict::Accepted { .. }));
    }
}
