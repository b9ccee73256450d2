#![deny(unsafe_code)]

//! Soloist core runtime.
//!
//! Enforces that at most one instance of an application runs per endpoint by
//! using a bound socket (Unix domain or loopback TCP) as the mutual-exclusion
//! token. The process that wins the bind becomes the singleton and may serve
//! hand-off connections; every later process becomes a duplicate that can
//! forward its payload to the singleton before exiting.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future — the standard return type for async
/// trait methods that require dynamic dispatch (`dyn Trait`).
///
/// Native `async fn` in traits produces opaque return types that are **not**
/// object-safe. Traits consumed via `Box<dyn Trait>` or `&dyn Trait` must
/// return a concrete `Pin<Box<dyn Future>>` instead. This alias keeps those
/// signatures readable.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lifecycle controller (`Created → RoleResolved → Running → Stopped`).
pub mod app;
/// Transport-agnostic connection over Unix or TCP streams.
pub mod connection;
/// Coordination endpoint descriptor.
pub mod endpoint;
/// Duplicate-side hand-off client.
pub mod handoff;
/// Collaborator hook trait supplied by the embedding application.
pub mod hooks;
/// Bind-as-lock acquisition and lock-artifact cleanup.
pub mod lock;
/// Singleton-side connection server.
pub mod server;

pub use app::{Options, Role, RunError, RunOutcome, SingletonApp, StopHandle, StopSignal};
pub use connection::Connection;
pub use endpoint::Endpoint;
pub use handoff::{HandoffError, HandoffTimeouts};
pub use hooks::{AppHooks, ConnectionOutcome, HookError};
pub use lock::{AcquireError, LockSocket};
