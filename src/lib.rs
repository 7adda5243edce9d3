#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

//! appium-service — supervisor for a locally launched Appium server.
//!
//! Launches the server process, waits until its status endpoint answers,
//! reports liveness, and shuts it down gracefully with a forceful fallback.
//!
//! ```no_run
//! use appium_service::{LocalService, ServiceConfig};
//!
//! # async fn run() -> Result<(), appium_service::ServiceError> {
//! let config = ServiceConfig::builder()
//!     .main_script("/usr/lib/node_modules/appium/build/lib/main.js")
//!     .port(4723)
//!     .argument("--base-path", Some("/wd/hub"))
//!     .build();
//! let service = LocalService::new(config);
//! service.on_output(|line| println!("{line}"));
//! service.start().await?;
//! // ... drive the server ...
//! service.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! config.rs          — ServiceConfig, builder, TOML + env-var loading
//! error.rs           — ServiceError, ConfigError
//! service/
//!   mod.rs           — LocalService: start, is_running, stop
//!   status.rs        — status URL resolution (base path, localhost rewrite)
//!   probe.rs         — readiness polling against the status URL
//!   spawn.rs         — launch command, Spawner seam
//!   output.rs        — stdout line pump, ordered output handlers
//!   shutdown.rs      — per-platform graceful stop (SIGINT / CTRL_C_EVENT)
//! blocking.rs        — synchronous wrapper over the async supervisor
//! ```

pub mod blocking;
pub mod config;
pub mod error;
pub mod service;

pub use config::{Config, ServiceConfig, ServiceConfigBuilder};
pub use error::{ConfigError, ServiceError};
pub use service::LocalService;
