//! memcached text-protocol client
//!
//! Only the `set` command is implemented:
//!
//! ```text
//! set <key> 0 0 <bytes>\r\n
//! <data>\r\n
//! -> STORED | NOT_STORED | ERROR | SERVER_ERROR <msg> | CLIENT_ERROR <msg>
//! ```
//!
//! Network failures and timeouts are reported as a falsy result and drop the
//! connection; the next call reconnects. Only requests the server can never
//! accept (bad key, `CLIENT_ERROR`) surface as [`StoreError`].

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{Store, StoreConnector, StoreError};

/// Longest key memcached accepts
pub const MAX_KEY_LENGTH: usize = 250;

/// Default socket timeout for connect and request round-trips
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens [`MemcacheClient`] connections
#[derive(Debug, Clone)]
pub struct MemcacheConnector {
    timeout: Duration,
}

impl MemcacheConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for MemcacheConnector {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl StoreConnector for MemcacheConnector {
    fn connect(&self, addr: &str) -> Box<dyn Store> {
        Box::new(MemcacheClient::new(addr, self.timeout))
    }
}

/// Single lazily-connected memcached connection
pub struct MemcacheClient {
    addr: String,
    timeout: Duration,
    conn: Option<BufReader<TcpStream>>,
}

impl MemcacheClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            conn: None,
        }
    }

    async fn open(&self) -> io::Result<BufReader<TcpStream>> {
        let stream = timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;
        debug!(addr = %self.addr, "Connected to memcached");
        Ok(BufReader::new(stream))
    }

    /// Send one `set` and return the server's reply line
    async fn request(&mut self, key: &str, value: &[u8]) -> io::Result<String> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.open().await?,
        };

        let reply = timeout(self.timeout, exchange(&mut conn, key, value))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "request timed out"))??;

        self.conn = Some(conn);
        Ok(reply)
    }
}

async fn exchange(conn: &mut BufReader<TcpStream>, key: &str, value: &[u8]) -> io::Result<String> {
    let header = format!("set {} 0 0 {}\r\n", key, value.len());
    let mut request = Vec::with_capacity(header.len() + value.len() + 2);
    request.extend_from_slice(header.as_bytes());
    request.extend_from_slice(value);
    request.extend_from_slice(b"\r\n");

    conn.get_mut().write_all(&request).await?;

    let mut reply = String::new();
    if conn.read_line(&mut reply).await? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        ));
    }
    Ok(reply.trim_end().to_string())
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let invalid = |reason| StoreError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(invalid("key is longer than 250 bytes"));
    }
    if key.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err(invalid("key contains whitespace or control characters"));
    }
    Ok(())
}

#[async_trait]
impl Store for MemcacheClient {
    async fn set(&mut self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        validate_key(key)?;

        match self.request(key, value).await {
            Ok(reply) if reply == "STORED" => Ok(true),
            Ok(reply) if reply.starts_with("CLIENT_ERROR") => {
                self.conn = None;
                Err(StoreError::Backend(reply))
            },
            Ok(reply) => {
                debug!(addr = %self.addr, key, reply = %reply, "Value not stored");
                Ok(false)
            },
            Err(err) => {
                warn!(addr = %self.addr, key, error = %err, "memcached request failed");
                Ok(false)
            },
        }
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}
