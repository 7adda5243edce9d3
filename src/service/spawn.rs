//! Child process construction.
//!
//! [`command`] turns a [`ServiceConfig`] into a ready-to-spawn
//! [`Command`]: literal arguments (no shell), merged environment, null stdin,
//! piped stdout, inherited stderr, and `kill_on_drop(true)` so a dropped
//! supervisor never leaves an orphan behind. The actual spawn goes through
//! the [`Spawner`] seam.

use std::process::Stdio;

use tokio::process::{Child, Command};

use super::status::tokenize;
use crate::config::ServiceConfig;

#[cfg(windows)]
use windows_sys::Win32::System::Threading::CREATE_NO_WINDOW;

/// Launches a prepared command.
pub trait Spawner: Send + Sync {
    fn spawn(&self, command: &mut Command) -> std::io::Result<Child>;
}

/// Spawns through the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSpawner;

impl Spawner for OsSpawner {
    fn spawn(&self, command: &mut Command) -> std::io::Result<Child> {
        command.spawn()
    }
}

/// Build the launch command for `config`.
pub fn command(config: &ServiceConfig) -> Command {
    let mut cmd = Command::new(config.executable());
    cmd.args(tokenize(config.arguments()))
        .envs(config.resolved_environment())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}
