//! Readers for compressed line-oriented input
//!
//! Input files are normally gzip-compressed (`*.tsv.gz`). The format is
//! detected from the gzip magic bytes rather than the file extension, so a
//! plain-text file with a `.gz` name (or the reverse) is still read correctly.
//!
//! # Examples
//!
//! ```rust,ignore
//! use memc_common::compression::open_lines;
//!
//! for line in open_lines("/appsinstalled/20170929000000.tsv.gz")? {
//!     let line = line?;
//!     // ...
//! }
//! ```

use crate::error::Result;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Buffered reader over a possibly compressed file
pub type InputReader = Box<dyn BufRead + Send>;

/// Open a file for buffered reading, transparently decompressing gzip
pub fn open_reader(path: impl AsRef<Path>) -> Result<InputReader> {
    let path = path.as_ref();
    let mut raw = BufReader::new(File::open(path)?);

    let is_gzip = raw.fill_buf()?.starts_with(&GZIP_MAGIC);
    debug!(path = %path.display(), gzip = is_gzip, "Opened input file");

    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(raw))))
    } else {
        Ok(Box::new(raw))
    }
}

/// Open a file and iterate over its lines
pub fn open_lines(path: impl AsRef<Path>) -> Result<Lines<InputReader>> {
    Ok(open_reader(path)?.lines())
}
