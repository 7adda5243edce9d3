//! Synchronous front end over [`service::LocalService`](crate::service::LocalService).
//!
//! [`LocalService`] owns a small tokio runtime and blocks on the async core
//! for every call, so there is exactly one implementation of the lifecycle.
//! The runtime keeps one worker thread alive between calls; that is where the
//! stdout pump runs and where output callbacks are invoked.
//!
//! These methods must not be called from inside an async context; use the
//! async [`crate::LocalService`] there instead.

use std::future::Future;

use tokio::runtime::Runtime;
use tracing::debug;
use url::Url;

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::service;

/// Blocking supervisor for one locally launched server process.
#[derive(Debug)]
pub struct LocalService {
    inner: service::LocalService,
    /// Only `None` while being dropped.
    runtime: Option<Runtime>,
}

impl LocalService {
    /// Create a blocking supervisor for `config`.
    ///
    /// Fails only if the runtime cannot be created.
    pub fn new(config: ServiceConfig) -> std::io::Result<Self> {
        Self::from_async(service::LocalService::new(config))
    }

    /// A service with the default configuration (`node` on `0.0.0.0:4723`).
    pub fn build_default() -> std::io::Result<Self> {
        Self::new(ServiceConfig::default())
    }

    /// Wrap an already constructed async supervisor.
    pub fn from_async(inner: service::LocalService) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("appium-service")
            .enable_all()
            .build()?;
        Ok(Self {
            inner,
            runtime: Some(runtime),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        self.inner.config()
    }

    pub fn service_url(&self) -> Result<Url, ServiceError> {
        self.inner.service_url()
    }

    pub fn status_url(&self) -> Result<Url, ServiceError> {
        self.inner.status_url()
    }

    pub fn on_output(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.on_output(handler);
    }

    pub fn remove_all_output_handlers(&self) {
        self.inner.remove_all_output_handlers();
    }

    /// Start the server and block until it is ready or the start failed.
    pub fn start(&self) -> Result<(), ServiceError> {
        self.block_on(self.inner.start())
    }

    pub fn is_running(&self) -> bool {
        self.block_on(self.inner.is_running())
    }

    /// Stop the server. Never fails; a no-op when nothing is running.
    pub fn stop(&self) {
        self.block_on(self.inner.stop());
    }

    pub fn pid(&self) -> Option<u32> {
        self.block_on(self.inner.pid())
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        match &self.runtime {
            Some(runtime) => runtime.block_on(future),
            None => unreachable!("runtime is only taken in drop"),
        }
    }
}

impl Drop for LocalService {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        // Neither block_on nor a blocking runtime drop is allowed inside a
        // runtime; the child is still killed when `inner` drops.
        if tokio::runtime::Handle::try_current().is_ok() {
            debug!("Dropping blocking service inside a runtime, skipping graceful stop");
            runtime.shutdown_background();
            return;
        }
        runtime.block_on(self.inner.stop());
    }
}
