//! Key-value store capability
//!
//! Workers only need `set(key, bytes)`. The result distinguishes three
//! outcomes:
//!
//! - `Ok(true)`: value stored
//! - `Ok(false)`: falsy result, worth retrying
//! - `Err(StoreError)`: the store raised, retrying is pointless
//!
//! Each worker opens its own connection through a [`StoreConnector`] and
//! never shares it.

pub mod memcache;

use async_trait::async_trait;
use thiserror::Error;

pub use memcache::{MemcacheClient, MemcacheConnector};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid key `{key}`: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("Store error: {0}")]
    Backend(String),
}

/// A single exclusive connection to a store
#[async_trait]
pub trait Store: Send {
    /// Write `value` under `key`
    async fn set(&mut self, key: &str, value: &[u8]) -> Result<bool, StoreError>;

    /// Address used in log lines
    fn addr(&self) -> &str;
}

/// Opens one store connection per worker
pub trait StoreConnector: Send + Sync {
    fn connect(&self, addr: &str) -> Box<dyn Store>;
}
