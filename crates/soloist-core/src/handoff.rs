//! Duplicate-side hand-off.
//!
//! Runs once, when another instance already holds the endpoint and data
//! passing is enabled: connect, let the application write its payload,
//! half-close the write side, read the one-line status the singleton sends
//! back, and map it to a process exit code. No retry — a failed hand-off is
//! reported and the duplicate exits non-zero.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::connection::Connection;
use crate::endpoint::Endpoint;
use crate::hooks::{AppHooks, HookError};

/// Bounds on how long a duplicate waits for the singleton.
///
/// A zero duration means wait forever (the minimal-design behavior).
#[derive(Debug, Clone)]
pub struct HandoffTimeouts {
    /// Bound on establishing the connection.
    pub connect: Duration,
    /// Bound on waiting for the status line after the payload is sent.
    pub response: Duration,
}

impl Default for HandoffTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            response: Duration::from_secs(10),
        }
    }
}

/// Errors from the duplicate-side hand-off.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    /// The singleton holds the endpoint but the connection failed anyway
    /// (e.g. it crashed between the bind race and this connect).
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// The connection was not established within the configured bound.
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    /// No status line arrived within the configured bound.
    #[error("timed out waiting for a status line from {0}")]
    ResponseTimeout(String),

    /// The payload-producing hook failed.
    #[error(transparent)]
    Hook(#[from] HookError),

    /// IO failure while writing the payload or reading the status line.
    #[error("hand-off IO error: {0}")]
    Io(#[from] io::Error),
}

/// Forward this process's payload to the singleton and return the exit code
/// it answered with.
///
/// `"0"` maps to 0, any other integer status to that integer, and an
/// unparseable or empty status line to 1.
pub async fn hand_off(
    endpoint: &Endpoint,
    hooks: &dyn AppHooks,
    timeouts: &HandoffTimeouts,
) -> Result<i32, HandoffError> {
    let mut conn = bounded(timeouts.connect, Connection::connect(endpoint))
        .await
        .ok_or_else(|| HandoffError::ConnectTimeout(endpoint.to_string()))?
        .map_err(|source| HandoffError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;

    hooks.produce_outbound(&mut conn).await?;

    // Half-close: signal end of payload while keeping the read side open for
    // the status line.
    conn.shutdown().await?;

    let mut reader = BufReader::new(conn);
    let mut line = String::new();
    bounded(timeouts.response, reader.read_line(&mut line))
        .await
        .ok_or_else(|| HandoffError::ResponseTimeout(endpoint.to_string()))??;

    let code = parse_status(&line);
    debug!(endpoint = %endpoint, code, "hand-off complete");
    Ok(code)
}

/// Run `future` under `limit`, treating a zero limit as unbounded.
async fn bounded<T>(limit: Duration, future: impl Future<Output = T>) -> Option<T> {
    if limit.is_zero() {
        Some(future.await)
    } else {
        tokio::time::timeout(limit, future).await.ok()
    }
}

/// Map the status line to an exit code: a parseable integer passes through,
/// anything else (including an empty line from a closed connection) is 1.
fn parse_status(line: &str) -> i32 {
    line.trim().parse::<i32>().unwrap_or(1)
}
