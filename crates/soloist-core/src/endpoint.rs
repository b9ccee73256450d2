//! Coordination endpoint — the address used as the mutual-exclusion token.

use std::fmt;
use std::path::{Path, PathBuf};

/// The address a singleton binds as its lock and, when data passing is
/// enabled, listens on for duplicate hand-off connections.
///
/// Chosen once at construction and never mutated. A Unix endpoint leaves a
/// socket file on disk while held; a TCP endpoint has no filesystem artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket at the given filesystem path.
    Unix(PathBuf),
    /// TCP socket bound to the given host and port.
    Tcp {
        /// Host or numeric address, typically loopback.
        host: String,
        /// Port number.
        port: u16,
    },
}

impl Endpoint {
    /// Create a Unix domain endpoint.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix(path.into())
    }

    /// Create a TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// The filesystem artifact this endpoint creates when bound, if any.
    pub fn artifact_path(&self) -> Option<&Path> {
        match self {
            Self::Unix(path) => Some(path),
            Self::Tcp { .. } => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp { host, port } => write!(f, "tcp:{host}:{port}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unix_display() {
        let endpoint = Endpoint::unix("/tmp/soloist.sock");
        assert_eq!(endpoint.to_string(), "unix:/tmp/soloist.sock");
    }

    #[test]
    fn test_tcp_display() {
        let endpoint = Endpoint::tcp("127.0.0.1", 4242);
        assert_eq!(endpoint.to_string(), "tcp:127.0.0.1:4242");
    }

    #[test]
    fn test_artifact_path_only_for_unix() {
        let unix = Endpoint::unix("/tmp/soloist.sock");
        assert_eq!(
            unix.artifact_path(),
            Some(Path::new("/tmp/soloist.sock"))
        );

        let tcp = Endpoint::tcp("127.0.0.1", 4242);
        assert_eq!(tcp.artifact_path(), None);
    }
}
