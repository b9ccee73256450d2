//! Canned [`AppHooks`] implementations for tests.
//!
//! [`RecordingHooks`] plays the singleton side: it records every payload it
//! receives and can be told to reject specific ones. [`SendHooks`] plays the
//! duplicate side: it forwards one line and remembers whether it was invoked
//! at all.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use soloist_core::hooks::{AppHooks, ConnectionOutcome, HookError};
use soloist_core::{BoxFuture, Connection, StopHandle};

/// Singleton-side hooks: record payloads, optionally fail on a marker, and
/// expose the captured [`StopHandle`] so tests can stop the app externally.
pub struct RecordingHooks {
    payloads: Mutex<Vec<String>>,
    stop: Mutex<Option<StopHandle>>,
    fail_marker: Option<String>,
}

impl RecordingHooks {
    /// Hooks that accept every payload.
    pub fn new() -> Self {
        Self {
            payloads: Mutex::new(Vec::new()),
            stop: Mutex::new(None),
            fail_marker: None,
        }
    }

    /// Hooks that report [`ConnectionOutcome::Failure`] for payloads equal to
    /// `marker` and accept everything else.
    pub fn fail_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::new()
        }
    }

    /// Every payload received so far, in arrival order.
    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().expect("payloads poisoned").clone()
    }

    /// Request a stop through the handle captured when `run` started.
    ///
    /// Waits briefly for the handle to be captured (the lifecycle controller
    /// may not have started the main-logic hook yet); returns false if it
    /// never appears.
    pub async fn request_stop(&self, code: i32) -> bool {
        for _ in 0..100 {
            if let Some(handle) = self.stop.lock().expect("stop slot poisoned").clone() {
                handle.request_stop(code);
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

impl Default for RecordingHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl AppHooks for RecordingHooks {
    fn run<'a>(&'a self, stop: StopHandle) -> BoxFuture<'a, Result<(), HookError>> {
        Box::pin(async move {
            {
                let mut slot = self.stop.lock().expect("stop slot poisoned");
                *slot = Some(stop);
            }
            // Run until stopped from outside.
            std::future::pending::<()>().await;
            Ok(())
        })
    }

    fn handle_client<'a>(
        &'a self,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<ConnectionOutcome, HookError>> {
        Box::pin(async move {
            let mut line = String::new();
            BufReader::new(conn).read_line(&mut line).await?;
            let payload = line.trim_end_matches('\n').to_string();

            let rejected = self.fail_marker.as_deref() == Some(payload.as_str());
            self.payloads
                .lock()
                .expect("payloads poisoned")
                .push(payload);

            if rejected {
                Ok(ConnectionOutcome::Failure)
            } else {
                Ok(ConnectionOutcome::Success)
            }
        })
    }
}

/// Duplicate-side hooks: forward one newline-terminated message.
pub struct SendHooks {
    message: String,
    invoked: AtomicBool,
}

impl SendHooks {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            invoked: AtomicBool::new(false),
        }
    }

    /// Whether `produce_outbound` ever ran.
    pub fn was_invoked(&self) -> bool {
        self.invoked.load(Ordering::SeqCst)
    }
}

impl AppHooks for SendHooks {
    fn produce_outbound<'a>(
        &'a self,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<(), HookError>> {
        Box::pin(async move {
            self.invoked.store(true, Ordering::SeqCst);
            conn.write_all(self.message.as_bytes()).await?;
            conn.write_all(b"\n").await?;
            Ok(())
        })
    }
}
