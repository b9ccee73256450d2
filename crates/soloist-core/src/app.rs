//! Lifecycle controller.
//!
//! Drives one process through `Created → RoleResolved → Running →
//! Stopped(code)`: attempt the bind, branch on the resulting role, run the
//! application (and the connection server, when data passing is enabled) or
//! the duplicate hand-off, and guarantee the lock is released — listener
//! closed, Unix socket artifact unlinked — exactly once on every clean exit
//! path: normal return, explicit stop, and interrupt.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use soloist_config::AppConfig;

use crate::endpoint::Endpoint;
use crate::handoff::{self, HandoffError, HandoffTimeouts};
use crate::hooks::{AppHooks, HookError};
use crate::lock::{AcquireError, LockSocket};
use crate::server;

/// Which side of the bind race this process landed on.
///
/// Determined exactly once per process and immutable afterwards. The
/// connection server and the hand-off client never coexist: a singleton
/// serves, a duplicate hands off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This process won the bind and owns the endpoint.
    Singleton,
    /// Another process already holds the endpoint.
    Duplicate,
}

/// Early-termination request sent over the stop control channel.
#[derive(Debug, Clone)]
pub struct StopSignal {
    /// Exit status the process should terminate with.
    pub code: i32,
}

/// Handle for requesting a stop from inside application logic.
///
/// Clone it freely and call [`request_stop`](Self::request_stop) from
/// anywhere — the request travels over a control channel to the lifecycle
/// controller, which runs cleanup before the code is returned to the caller.
/// The first stop wins; later requests are ignored.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: mpsc::Sender<StopSignal>,
}

impl StopHandle {
    pub(crate) fn new(tx: mpsc::Sender<StopSignal>) -> Self {
        Self { tx }
    }

    /// Ask the lifecycle controller to stop with the given exit status.
    pub fn request_stop(&self, code: i32) {
        // Capacity-1 channel: a full buffer means a stop is already pending
        // and this later request loses the race by design.
        let _ = self.tx.try_send(StopSignal { code });
    }
}

/// Construction options, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Options {
    /// Whether the singleton serves hand-off connections at all. When false,
    /// a duplicate has no server to talk to and exits without connecting.
    pub listen: bool,
    /// Duplicate-side wait bounds.
    pub timeouts: HandoffTimeouts,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            listen: false,
            timeouts: HandoffTimeouts::default(),
        }
    }
}

/// How the process lifetime ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// The role this process resolved to.
    pub role: Role,
    /// The exit status the process should terminate with.
    pub exit_code: i32,
}

/// Errors that end the run abnormally.
///
/// A bind conflict is *not* one of these — it is the expected duplicate
/// discriminator and is handled internally.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The endpoint is unusable for a reason other than contention.
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    /// The duplicate could not complete its hand-off.
    #[error(transparent)]
    Handoff(#[from] HandoffError),

    /// The application's main logic failed.
    #[error("application logic failed: {0}")]
    App(#[source] HookError),
}

/// A single-instance application bound to one endpoint.
#[derive(Debug, Clone)]
pub struct SingletonApp {
    endpoint: Endpoint,
    options: Options,
}

impl SingletonApp {
    /// Create an application with the given endpoint and options.
    pub fn new(endpoint: Endpoint, options: Options) -> Self {
        Self { endpoint, options }
    }

    /// Build an application from loaded configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let instance = &config.instance;
        let endpoint = match instance.listen_port {
            Some(port) => Endpoint::tcp(instance.listen_addr.clone(), port),
            None => Endpoint::unix(&instance.socket_path),
        };
        let options = Options {
            listen: instance.listen,
            timeouts: HandoffTimeouts {
                connect: std::time::Duration::from_millis(config.handoff.connect_timeout_ms),
                response: std::time::Duration::from_millis(config.handoff.response_timeout_ms),
            },
        };
        Self::new(endpoint, options)
    }

    /// The endpoint this application coordinates on.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Resolve the role and run the corresponding process lifetime.
    ///
    /// Returns the exit status the process should terminate with; the
    /// library never exits the process itself. A singleton runs until its
    /// main logic returns, a stop is requested, or an interrupt (Ctrl-C)
    /// arrives — all three paths release the lock and remove the socket
    /// artifact before returning.
    pub async fn run(&self, hooks: Arc<dyn AppHooks>) -> Result<RunOutcome, RunError> {
        match LockSocket::acquire(&self.endpoint).await {
            Ok(lock) => self.run_singleton(lock, hooks).await,
            Err(AcquireError::InUse(_)) => {
                info!(endpoint = %self.endpoint, "endpoint already held, running as duplicate");
                self.run_duplicate(hooks).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn run_duplicate(&self, hooks: Arc<dyn AppHooks>) -> Result<RunOutcome, RunError> {
        if !self.options.listen {
            debug!("data passing disabled, duplicate exits without contacting the singleton");
            return Ok(RunOutcome {
                role: Role::Duplicate,
                exit_code: 0,
            });
        }

        let code = handoff::hand_off(&self.endpoint, hooks.as_ref(), &self.options.timeouts).await?;
        Ok(RunOutcome {
            role: Role::Duplicate,
            exit_code: code,
        })
    }

    async fn run_singleton(
        &self,
        lock: LockSocket,
        hooks: Arc<dyn AppHooks>,
    ) -> Result<RunOutcome, RunError> {
        info!(endpoint = %self.endpoint, listen = self.options.listen, "running as singleton");

        let (listener, mut artifact) = lock.into_parts();
        let (stop_tx, mut stop_rx) = mpsc::channel::<StopSignal>(1);

        // When not listening, the bound handle is simply held until cleanup;
        // the endpoint stays claimed either way.
        let mut held_listener = None;
        let mut server_task = None;
        let mut server_shutdown = None;
        if self.options.listen {
            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
            server_task = Some(tokio::spawn(server::serve(
                listener,
                Arc::clone(&hooks),
                shutdown_rx,
            )));
            server_shutdown = Some(shutdown_tx);
        } else {
            held_listener = Some(listener);
        }

        let mut exit_code = 0;
        let mut app_error = None;
        tokio::select! {
            result = hooks.run(StopHandle::new(stop_tx.clone())) => {
                match result {
                    Ok(()) => debug!("application logic returned, stopping"),
                    Err(e) => app_error = Some(e),
                }
            }
            signal = stop_rx.recv() => {
                if let Some(StopSignal { code }) = signal {
                    info!(code, "stop requested");
                    exit_code = code;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupt received, shutting down");
            }
        }

        // The one cleanup site, shared by all exit paths: stop the accept
        // loop (unblocking any pending accept), close the listener, unlink
        // the artifact.
        if let Some(shutdown_tx) = server_shutdown {
            let _ = shutdown_tx.send(server::Shutdown);
        }
        if let Some(task) = server_task {
            let _ = task.await;
        }
        drop(held_listener);
        artifact.remove();

        if let Some(e) = app_error {
            return Err(RunError::App(e));
        }
        Ok(RunOutcome {
            role: Role::Singleton,
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use soloist_config::AppConfig;
    // Import from the externally built crate so these types unify with the
    // ones inside soloist-test-utils fixtures.
    use soloist_core::{
        AppHooks, Endpoint, HandoffTimeouts, LockSocket, Options, Role, RunError, SingletonApp,
    };
    use std::sync::Arc;
    use soloist_test_utils::config::TestConfigBuilder;
    use soloist_test_utils::endpoint::TempEndpoint;
    use soloist_test_utils::hooks::{RecordingHooks, SendHooks};
    use soloist_test_utils::tracing_setup::init_test_tracing;
    use std::time::Duration;

    async fn wait_for_artifact(endpoint: &Endpoint) {
        let path = endpoint.artifact_path().unwrap().to_path_buf();
        for _ in 0..50 {
            if path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("singleton never bound {}", path.display());
    }

    fn listening_options() -> Options {
        Options {
            listen: true,
            timeouts: HandoffTimeouts::default(),
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle_with_hand_off() {
        init_test_tracing();
        let temp = TempEndpoint::unix();

        let singleton_hooks = Arc::new(RecordingHooks::fail_on("fail"));
        let app = SingletonApp::new(temp.endpoint.clone(), listening_options());
        let singleton = {
            let app = app.clone();
            let hooks = Arc::clone(&singleton_hooks);
            tokio::spawn(async move { app.run(hooks).await })
        };
        wait_for_artifact(&temp.endpoint).await;

        // A duplicate whose payload the singleton accepts exits 0.
        let ok = app.run(Arc::new(SendHooks::new("hello"))).await.unwrap();
        assert_eq!(ok.role, Role::Duplicate);
        assert_eq!(ok.exit_code, 0);

        // A duplicate whose payload the hook rejects exits 1.
        let rejected = app.run(Arc::new(SendHooks::new("fail"))).await.unwrap();
        assert_eq!(rejected.role, Role::Duplicate);
        assert_eq!(rejected.exit_code, 1);

        assert_eq!(singleton_hooks.payloads(), vec!["hello", "fail"]);

        // Explicit stop from application logic carries its code out.
        assert!(singleton_hooks.request_stop(7).await);
        let outcome = singleton.await.unwrap().unwrap();
        assert_eq!(outcome.role, Role::Singleton);
        assert_eq!(outcome.exit_code, 7);

        // Cleanup ran: the artifact is gone and the endpoint is reusable.
        assert!(!temp.endpoint.artifact_path().unwrap().exists());
        let relock = LockSocket::acquire(&temp.endpoint).await;
        assert!(relock.is_ok());
    }

    #[tokio::test]
    async fn test_normal_return_is_exit_zero() {
        let temp = TempEndpoint::unix();

        struct ReturnsImmediately;
        impl AppHooks for ReturnsImmediately {}

        let app = SingletonApp::new(temp.endpoint.clone(), Options::default());
        let outcome = app.run(Arc::new(ReturnsImmediately)).await.unwrap();
        assert_eq!(outcome.role, Role::Singleton);
        assert_eq!(outcome.exit_code, 0);
        assert!(!temp.endpoint.artifact_path().unwrap().exists());
    }

    #[tokio::test]
    async fn test_duplicate_without_listen_never_connects() {
        let temp = TempEndpoint::unix();

        // Hold the endpoint without any server behind it.
        let singleton_hooks = Arc::new(RecordingHooks::new());
        let app = SingletonApp::new(temp.endpoint.clone(), Options::default());
        let singleton = {
            let app = app.clone();
            let hooks = Arc::clone(&singleton_hooks);
            tokio::spawn(async move { app.run(hooks).await })
        };
        wait_for_artifact(&temp.endpoint).await;

        // The duplicate's payload hook must never run: a connect attempt
        // against the non-listening singleton would error, and SendHooks
        // records whether it was invoked.
        let send = Arc::new(SendHooks::new("never sent"));
        let outcome = app.run(Arc::<SendHooks>::clone(&send)).await.unwrap();
        assert_eq!(outcome.role, Role::Duplicate);
        assert_eq!(outcome.exit_code, 0);
        assert!(!send.was_invoked());

        assert!(singleton_hooks.request_stop(0).await);
        singleton.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unusable_endpoint_is_a_hard_failure() {
        let app = SingletonApp::new(
            Endpoint::unix("/nonexistent-dir/deeper/soloist.sock"),
            Options::default(),
        );
        let result = app.run(Arc::new(RecordingHooks::new())).await;
        assert!(matches!(result, Err(RunError::Acquire(_))));
    }

    #[tokio::test]
    async fn test_repeated_stop_requests_keep_first_code() {
        let temp = TempEndpoint::unix();

        let hooks = Arc::new(RecordingHooks::new());
        let app = SingletonApp::new(temp.endpoint.clone(), listening_options());
        let singleton = {
            let app = app.clone();
            let hooks = Arc::clone(&hooks);
            tokio::spawn(async move { app.run(hooks).await })
        };
        wait_for_artifact(&temp.endpoint).await;

        // Stop twice, as main logic and a concurrent path might; the first
        // code wins and cleanup still runs exactly once.
        assert!(hooks.request_stop(3).await);
        hooks.request_stop(9).await;

        let outcome = singleton.await.unwrap().unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert!(!temp.endpoint.artifact_path().unwrap().exists());
    }

    #[tokio::test]
    async fn test_from_config_resolves_tcp_when_port_set() {
        let config = TestConfigBuilder::new()
            .listen_addr("127.0.0.1")
            .listen_port(4242)
            .listen(true)
            .build();
        let app = SingletonApp::from_config(&config);
        assert_eq!(app.endpoint(), &Endpoint::tcp("127.0.0.1", 4242));
    }

    #[tokio::test]
    async fn test_from_config_defaults_to_unix_socket() {
        let config = AppConfig::parse("").unwrap();
        let app = SingletonApp::from_config(&config);
        assert_eq!(
            app.endpoint(),
            &Endpoint::unix("/tmp/soloist.sock")
        );
    }
}
