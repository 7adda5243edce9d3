//! The local server supervisor.
//!
//! [`LocalService`] owns exactly one child process at a time and drives it
//! through `start → (ready) → stop`:
//!
//! - **start** — spawn the configured executable, forward its stdout to the
//!   registered [`OutputHandlers`], then poll the status endpoint until it
//!   answers or the readiness timeout expires.
//! - **is_running** — a short status probe; a process that exists but no
//!   longer answers is reported as not running.
//! - **stop** — graceful stop through [`PlatformStop`], forceful kill as the
//!   fallback, then unconditional release of the child, the stdout pump and
//!   the probing client.
//!
//! Every entry point holds the state lock for its whole duration, so calls
//! on one instance never overlap. Children are spawned with
//! `kill_on_drop(true)`; dropping the service without `stop` still kills the
//! process, just without the graceful attempt.

pub mod output;
pub mod probe;
pub mod shutdown;
pub mod spawn;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use output::OutputHandlers;
use shutdown::{GracefulStop, PlatformStop, GRACEFUL_TIMEOUT};
use spawn::{OsSpawner, Spawner};

/// How long `stop` lets the stdout pump drain after the child is gone.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Supervisor for one locally launched server process.
pub struct LocalService {
    config: ServiceConfig,
    output: OutputHandlers,
    spawner: Arc<dyn Spawner>,
    stopper: PlatformStop,
    state: Mutex<State>,
}

/// Everything owned for the duration of one start/stop cycle.
#[derive(Default)]
struct State {
    process: Option<ServiceProcess>,
    /// Shared probing client; dropped on teardown, rebuilt by the next start.
    http: Option<reqwest::Client>,
}

struct ServiceProcess {
    child: Child,
    pump: Option<JoinHandle<()>>,
}

impl LocalService {
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_spawner(config, OsSpawner)
    }

    /// A service with the default configuration (`node` on `0.0.0.0:4723`).
    pub fn build_default() -> Self {
        Self::new(ServiceConfig::default())
    }

    /// Use `spawner` instead of the OS to launch the child.
    pub fn with_spawner(config: ServiceConfig, spawner: impl Spawner + 'static) -> Self {
        Self {
            config,
            output: OutputHandlers::new(),
            spawner: Arc::new(spawner),
            stopper: PlatformStop::default(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Base URL of the managed server, `http://<bind-address>:<port>/`.
    pub fn service_url(&self) -> Result<Url, ServiceError> {
        status::service_url(self.config.bind_address(), self.config.port())
    }

    /// URL polled for readiness and liveness. Recomputed on every call.
    pub fn status_url(&self) -> Result<Url, ServiceError> {
        status::status_url(
            self.config.arguments(),
            self.config.bind_address(),
            self.config.port(),
        )
    }

    /// Register a callback for each line the server writes to stdout.
    ///
    /// Callbacks run on the runtime's worker threads, in registration order.
    /// Registering from inside a callback deadlocks.
    pub fn on_output(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.output.push(handler);
    }

    pub fn remove_all_output_handlers(&self) {
        self.output.clear();
    }

    /// Pid of the current child, if one is held.
    pub async fn pid(&self) -> Option<u32> {
        let state = self.state.lock().await;
        state.process.as_ref().and_then(|p| p.child.id())
    }

    /// Start the server and wait until it answers its status endpoint.
    ///
    /// A no-op when the current child is already answering.
    pub async fn start(&self) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;

        if self.is_running_locked(&mut state).await {
            debug!("Service already running, start is a no-op");
            return Ok(());
        }
        if state.process.is_some() {
            warn!("Previous service process is not answering, replacing it");
            self.teardown(&mut state).await;
        }

        let status_url = self.status_url()?;
        let client = Self::client(&mut state)?;
        let executable = self.config.executable().to_path_buf();
        let arguments = self.config.arguments().to_string();

        let mut cmd = spawn::command(&self.config);
        let mut child = match self.spawner.spawn(&mut cmd) {
            Ok(child) => child,
            Err(source) => {
                self.teardown(&mut state).await;
                return Err(ServiceError::Launch {
                    executable,
                    arguments,
                    source,
                });
            }
        };

        info!(
            "Started {} {} (pid {:?})",
            executable.display(),
            arguments,
            child.id()
        );
        let pump = child
            .stdout
            .take()
            .map(|stdout| output::spawn_pump(stdout, self.output.clone()));
        state.process = Some(ServiceProcess { child, pump });

        let timeout = self.config.readiness_timeout();
        if probe::probe(&client, &status_url, timeout).await {
            info!("Service is ready at {status_url}");
            return Ok(());
        }

        warn!(
            "Service did not answer {status_url} within {}ms, tearing down",
            timeout.as_millis()
        );
        self.teardown(&mut state).await;
        Err(ServiceError::ReadinessTimeout {
            executable,
            arguments,
            timeout,
        })
    }

    /// Whether the current child answers its status endpoint right now.
    pub async fn is_running(&self) -> bool {
        let mut state = self.state.lock().await;
        self.is_running_locked(&mut state).await
    }

    /// Stop the server: graceful attempt, forceful fallback, release.
    ///
    /// Never fails; a no-op when nothing is running.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if state.process.is_none() {
            return;
        }
        self.teardown(&mut state).await;
    }

    async fn is_running_locked(&self, state: &mut State) -> bool {
        let Some(process) = &state.process else {
            return false;
        };
        if process.child.id().is_none() {
            return false;
        }
        let Ok(url) = self.status_url() else {
            return false;
        };
        let Ok(client) = Self::client(state) else {
            return false;
        };
        probe::probe(&client, &url, probe::LIVENESS_TIMEOUT).await
    }

    fn client(state: &mut State) -> Result<reqwest::Client, ServiceError> {
        if let Some(client) = &state.http {
            return Ok(client.clone());
        }
        let client = probe::build_client()?;
        state.http = Some(client.clone());
        Ok(client)
    }

    async fn teardown(&self, state: &mut State) {
        if let Some(mut process) = state.process.take() {
            let pid = process.child.id();
            if self
                .stopper
                .attempt(&mut process.child, GRACEFUL_TIMEOUT)
                .await
            {
                info!("Service process {pid:?} stopped gracefully");
            } else {
                if self.stopper.is_supported() {
                    warn!("Service process {pid:?} did not stop gracefully, killing it");
                } else {
                    debug!("No graceful stop on this platform, killing {pid:?}");
                }
                if let Err(e) = process.child.kill().await {
                    debug!("Kill of service process {pid:?} failed: {e}");
                }
            }

            if let Some(mut pump) = process.pump.take() {
                if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, &mut pump)
                    .await
                    .is_err()
                {
                    pump.abort();
                }
            }
        }
        state.http = None;
    }
}

impl std::fmt::Debug for LocalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalService")
            .field("config", &self.config)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}
