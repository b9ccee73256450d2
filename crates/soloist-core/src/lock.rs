//! Bind-as-lock acquisition.
//!
//! The operating system guarantees that only one process may bind a given
//! Unix socket path or TCP address/port at a time, so a successful bind *is*
//! the mutual-exclusion token. The process that wins the bind is the
//! singleton; a bind that fails with "address in use" marks the caller as a
//! duplicate.
//!
//! A held Unix endpoint leaves a socket file on disk. That artifact is
//! removed on every clean shutdown path, but not under SIGKILL — a stale
//! file left by a killed singleton makes the next bind fail with
//! [`AcquireError::InUse`] and must be removed by hand. This is an accepted
//! limitation: the lock must never be unlinked before binding, because the
//! existing path is exactly what mediates mutual exclusion.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tokio::net::{TcpListener, UnixListener};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::endpoint::Endpoint;

/// Errors from attempting to acquire the lock socket.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// Another process already holds the endpoint. This is the expected
    /// duplicate discriminator, not a failure of the caller.
    #[error("endpoint {0} is already held by another instance")]
    InUse(String),

    /// The bind failed for a reason other than contention (permissions,
    /// invalid path, unusable address). Surfaced as a hard startup failure
    /// rather than silently treated as a running instance.
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// The socket file was created but could not be restricted to
    /// owner-only access.
    #[error("failed to set permissions on {path}: {source}")]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The bound listening handle, generic over endpoint flavour.
#[derive(Debug)]
pub enum Listener {
    /// Listener on a Unix domain socket.
    Unix(UnixListener),
    /// Listener on a TCP socket.
    Tcp(TcpListener),
}

impl Listener {
    /// Accept one inbound connection.
    pub async fn accept(&self) -> io::Result<Connection> {
        match self {
            Self::Unix(listener) => {
                let (stream, _addr) = listener.accept().await?;
                Ok(Connection::Unix(stream))
            }
            Self::Tcp(listener) => {
                let (stream, _addr) = listener.accept().await?;
                Ok(Connection::Tcp(stream))
            }
        }
    }

    /// The locally bound TCP address, when this is a TCP listener.
    ///
    /// Useful when binding port 0 and needing the ephemeral port back.
    pub fn tcp_addr(&self) -> Option<std::net::SocketAddr> {
        match self {
            Self::Unix(_) => None,
            Self::Tcp(listener) => listener.local_addr().ok(),
        }
    }
}

/// Guard for the on-disk lock artifact of a Unix endpoint.
///
/// Removal is idempotent: the first call unlinks the socket file, later
/// calls are no-ops, and a missing file is never an error. Dropping the
/// guard removes the artifact as a best-effort fallback.
#[derive(Debug)]
pub struct Artifact {
    path: Option<PathBuf>,
}

impl Artifact {
    /// Remove the artifact from disk, if it exists and was not already
    /// removed.
    pub fn remove(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed lock artifact"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove lock artifact"),
            }
        }
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        self.remove();
    }
}

/// A successfully acquired lock: the bound listener plus the artifact guard.
#[derive(Debug)]
pub struct LockSocket {
    listener: Listener,
    artifact: Artifact,
}

impl LockSocket {
    /// Attempt to bind the endpoint, claiming the singleton role on success.
    ///
    /// An `AddrInUse` bind failure is returned as [`AcquireError::InUse`];
    /// every other bind error is a hard failure. For Unix endpoints the
    /// socket file is restricted to mode 0600 immediately after the bind
    /// succeeds.
    pub async fn acquire(endpoint: &Endpoint) -> Result<Self, AcquireError> {
        let listener = match endpoint {
            Endpoint::Unix(path) => UnixListener::bind(path)
                .map(Listener::Unix)
                .map_err(|e| classify_bind_error(endpoint, e))?,
            Endpoint::Tcp { host, port } => TcpListener::bind((host.as_str(), *port))
                .await
                .map(Listener::Tcp)
                .map_err(|e| classify_bind_error(endpoint, e))?,
        };

        let artifact_path = endpoint.artifact_path().map(PathBuf::from);
        if let Some(path) = &artifact_path {
            // Owner-only access on the socket file, before anyone can connect
            // with broader permissions.
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(
                |source| {
                    let _ = std::fs::remove_file(path);
                    AcquireError::Permissions {
                        path: path.clone(),
                        source,
                    }
                },
            )?;
        }

        debug!(endpoint = %endpoint, "acquired lock socket");
        Ok(Self {
            listener,
            artifact: Artifact {
                path: artifact_path,
            },
        })
    }

    /// Split the lock into its listener (for the connection server) and the
    /// artifact guard (for cleanup).
    pub fn into_parts(self) -> (Listener, Artifact) {
        (self.listener, self.artifact)
    }
}

fn classify_bind_error(endpoint: &Endpoint, source: io::Error) -> AcquireError {
    if source.kind() == io::ErrorKind::AddrInUse {
        AcquireError::InUse(endpoint.to_string())
    } else {
        AcquireError::Bind {
            endpoint: endpoint.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    // Shadow the glob imports with the externally built crate so these types
    // unify with the ones inside soloist-test-utils fixtures.
    use soloist_core::{AcquireError, Endpoint, LockSocket};
    use soloist_test_utils::endpoint::TempEndpoint;

    #[tokio::test]
    async fn test_unix_bind_conflict_is_in_use() {
        let temp = TempEndpoint::unix();
        let _held = LockSocket::acquire(&temp.endpoint).await.unwrap();

        let second = LockSocket::acquire(&temp.endpoint).await;
        assert!(matches!(second, Err(AcquireError::InUse(_))));
    }

    #[tokio::test]
    async fn test_tcp_bind_conflict_is_in_use() {
        // Uses the in-crate (test build) types: the private `listener` field
        // is only reachable from this module's own crate.
        let held = super::LockSocket::acquire(&super::Endpoint::tcp("127.0.0.1", 0))
            .await
            .unwrap();
        let port = held.listener.tcp_addr().unwrap().port();

        let second = super::LockSocket::acquire(&super::Endpoint::tcp("127.0.0.1", port)).await;
        assert!(matches!(second, Err(super::AcquireError::InUse(_))));
    }

    #[test_log::test(tokio::test)]
    async fn test_exactly_one_concurrent_acquire_wins() {
        let temp = TempEndpoint::unix();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let endpoint = temp.endpoint.clone();
            tasks.push(tokio::spawn(
                async move { LockSocket::acquire(&endpoint).await },
            ));
        }

        let mut winners = 0;
        let mut locks = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(lock) => {
                    winners += 1;
                    locks.push(lock);
                }
                Err(AcquireError::InUse(_)) => {}
                Err(e) => panic!("unexpected acquire error: {e}"),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_artifact_mode_is_owner_only() {
        let temp = TempEndpoint::unix();
        let _held = LockSocket::acquire(&temp.endpoint).await.unwrap();

        let path = temp.endpoint.artifact_path().unwrap();
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_artifact_removal_is_idempotent() {
        let temp = TempEndpoint::unix();
        let lock = LockSocket::acquire(&temp.endpoint).await.unwrap();
        let path = temp.endpoint.artifact_path().unwrap().to_path_buf();

        let (listener, mut artifact) = lock.into_parts();
        drop(listener);

        artifact.remove();
        assert!(!path.exists());

        // Second removal is a no-op, never an error.
        artifact.remove();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_rebind_after_release() {
        let temp = TempEndpoint::unix();

        let lock = LockSocket::acquire(&temp.endpoint).await.unwrap();
        let (listener, mut artifact) = lock.into_parts();
        drop(listener);
        artifact.remove();

        // The lock is fully released: a fresh acquire wins again.
        let relocked = LockSocket::acquire(&temp.endpoint).await;
        assert!(relocked.is_ok());
    }

    #[tokio::test]
    async fn test_unusable_path_is_a_hard_failure() {
        let endpoint = Endpoint::unix("/nonexistent-dir/deeper/soloist.sock");
        let result = LockSocket::acquire(&endpoint).await;
        assert!(matches!(result, Err(AcquireError::Bind { .. })));
    }
}
