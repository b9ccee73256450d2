//! Singleton-side connection server.
//!
//! Accepts hand-off connections from duplicate instances for the lifetime of
//! the singleton, delegating each payload to the application's
//! [`AppHooks::handle_client`] hook and writing back a one-line status code.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::hooks::{AppHooks, ConnectionOutcome};
use crate::lock::Listener;

/// Shutdown notice for the accept loop, sent via broadcast channel.
#[derive(Debug, Clone)]
pub struct Shutdown;

/// Run the accept loop until a [`Shutdown`] is received.
///
/// Each accepted connection is served on its own task, so a slow payload
/// hook never stalls acceptance of further connections. Per-connection
/// failures — hook errors, write errors, accept errors — are contained and
/// logged; the loop itself only exits on shutdown. Connections are
/// independent: no ordering is imposed beyond OS accept-queue order.
pub async fn serve(
    listener: Listener,
    hooks: Arc<dyn AppHooks>,
    mut shutdown_rx: broadcast::Receiver<Shutdown>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("connection server shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => {
                    let hooks = Arc::clone(&hooks);
                    tokio::spawn(handle_connection(conn, hooks));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
    }
    // Dropping the listener here releases the bind; the lifecycle controller
    // removes any filesystem artifact afterwards.
}

/// Serve one connection: delegate the payload, answer with the status line,
/// close.
async fn handle_connection(mut conn: Connection, hooks: Arc<dyn AppHooks>) {
    let outcome = match hooks.handle_client(&mut conn).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "client payload hook failed");
            ConnectionOutcome::Failure
        }
    };

    let status: &[u8] = match outcome {
        ConnectionOutcome::Success => b"0\n",
        ConnectionOutcome::Failure => b"1\n",
    };
    if let Err(e) = conn.write_all(status).await {
        warn!(error = %e, "failed to write status line");
        return;
    }
    let _ = conn.shutdown().await;
    debug!(?outcome, "served hand-off connection");
}
