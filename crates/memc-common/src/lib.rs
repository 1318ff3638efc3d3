//! memc-load Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, logging, and input helpers for the memc-load workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`MemcError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Compression**: line readers over gzip-compressed input files
//!
//! # Example
//!
//! ```no_run
//! use memc_common::compression::open_lines;
//! use memc_common::Result;
//!
//! fn count_lines(path: &str) -> Result<usize> {
//!     let mut count = 0;
//!     for line in open_lines(path)? {
//!         line?;
//!         count += 1;
//!     }
//!     Ok(count)
//! }
//! ```

pub mod compression;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{MemcError, Result};
