//! Endpoint fixtures for tests.
//!
//! Helpers for constructing throwaway endpoints whose filesystem artifacts
//! cannot collide across concurrently running tests.

use soloist_core::Endpoint;
use tempfile::TempDir;

/// A test-scoped Unix endpoint with an owned temp directory for the socket.
///
/// The temp directory is deleted automatically when this value is dropped,
/// guaranteeing cleanup even on panic.
pub struct TempEndpoint {
    pub endpoint: Endpoint,
    _temp_dir: TempDir,
}

impl TempEndpoint {
    /// Create a fresh Unix endpoint inside its own temp directory.
    pub fn unix() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let endpoint = Endpoint::unix(temp_dir.path().join("soloist.sock"));
        Self {
            endpoint,
            _temp_dir: temp_dir,
        }
    }
}
