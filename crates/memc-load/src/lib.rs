//! memc-load
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads gzip-compressed, tab-separated device-install logs into memcached.
//!
//! # Pipeline
//!
//! ```text
//! JobScheduler ──(one job per file)──> Dispatcher ──(queue per type)──> TypeWorker ──> Store
//!                                                                            │
//!                                          StatsAggregator <──(one report)───┘
//! ```
//!
//! - [`scheduler`] discovers files, runs jobs concurrently, consumes results
//!   in sorted order, and renames each loaded file with a leading dot
//! - [`job`] wires one file's dispatcher, workers and aggregator
//! - [`dispatcher`] routes lines by device type and closes every queue with
//!   a sentinel
//! - [`worker`] parses, encodes and writes records with [`retry`]
//! - [`stats`] sums worker reports and decides the error-rate verdict

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod payload;
pub mod record;
pub mod retry;
pub mod scheduler;
pub mod selftest;
pub mod stats;
pub mod store;
pub mod worker;

pub use config::LoaderConfig;
pub use error::RecordError;
pub use scheduler::{JobScheduler, RunSummary};
