//! Collaborator hooks — the seam between the runtime and the application.
//!
//! The embedding application supplies one [`AppHooks`] implementation. Every
//! method has a default, so a fire-and-forget singleton with no data passing
//! compiles with an empty `impl AppHooks for MyApp {}`.
//!
//! Hooks are capability-scoped: they receive only the live connection (or
//! the stop handle) and return a typed outcome. They get no access to the
//! lifecycle controller's internals.

use crate::BoxFuture;
use crate::app::StopHandle;
use crate::connection::Connection;

/// Result of handling one client payload, mapped 1:1 to the status line
/// written back to the duplicate (`"0"` for success, `"1"` for failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// The payload was dealt with; the duplicate exits 0.
    Success,
    /// The payload could not be handled; the duplicate exits 1.
    Failure,
}

/// Errors raised by collaborator hooks.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// Application-defined failure.
    #[error("hook failed: {0}")]
    Failed(String),

    /// IO failure while the hook was using the connection.
    #[error("hook IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The behaviors an application plugs into the singleton runtime.
pub trait AppHooks: Send + Sync {
    /// Application main logic, run only by the singleton.
    ///
    /// Runs until it returns (normal termination, exit code 0) or until it
    /// requests early termination via [`StopHandle::request_stop`] — which
    /// works from arbitrarily deep in the call stack, since the handle is
    /// `Clone` and the request travels over a control channel.
    fn run<'a>(&'a self, stop: StopHandle) -> BoxFuture<'a, Result<(), HookError>> {
        let _ = stop;
        Box::pin(async { Ok(()) })
    }

    /// Handle one client payload on the singleton side.
    ///
    /// Read from `conn` with whatever semantics the payload needs — a single
    /// read, a line, or streaming until EOF (the duplicate half-closes its
    /// write side when done). An `Err` is contained: it counts as
    /// [`ConnectionOutcome::Failure`] for this connection only and the accept
    /// loop keeps serving.
    fn handle_client<'a>(
        &'a self,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<ConnectionOutcome, HookError>> {
        let _ = conn;
        Box::pin(async { Ok(ConnectionOutcome::Success) })
    }

    /// Write this duplicate's payload to the singleton.
    ///
    /// Do not close or shut down `conn` — the runtime half-closes the write
    /// side after this hook returns and then reads the status line.
    fn produce_outbound<'a>(
        &'a self,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<(), HookError>> {
        let _ = conn;
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;
    impl AppHooks for Bare {}

    #[tokio::test]
    async fn test_default_run_returns_immediately() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let stop = StopHandle::new(tx);
        assert!(Bare.run(stop).await.is_ok());
    }

    #[tokio::test]
    async fn test_default_handle_client_succeeds() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("hooks.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let endpoint = crate::Endpoint::unix(&path);
        let (_client, accepted) = tokio::join!(
            async { Connection::connect(&endpoint).await.unwrap() },
            async { listener.accept().await.unwrap().0 }
        );
        let mut conn = Connection::Unix(accepted);

        let outcome = Bare.handle_client(&mut conn).await.unwrap();
        assert_eq!(outcome, ConnectionOutcome::Success);
    }
}
