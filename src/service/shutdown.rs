//! Graceful stop of the supervised process.
//!
//! [`GracefulStop`] asks the child to exit on its own and waits a bounded
//! time for it. Each platform family has one implementation, selected at
//! compile time as [`PlatformStop`]:
//!
//! - **Windows** — attach to the child's console and broadcast `CTRL_C_EVENT`.
//!   A supervisor that runs in its own console (the CLI) briefly gives it up
//!   and re-attaches to its parent's console afterwards.
//! - **Unix** — deliver `SIGINT` to the child's pid.
//! - **Anything else** — always reports failure.
//!
//! A `false` result never escalates here; the supervisor falls back to a
//! forceful kill in a platform-agnostic way.

use std::future::Future;
use std::time::Duration;

use tokio::process::Child;
use tracing::debug;

/// Fixed bound on the graceful wait, independent of the readiness timeout.
pub const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(5);

/// A cooperative stop request for a child process.
pub trait GracefulStop: Send + Sync {
    /// Whether this platform can deliver a cooperative stop at all.
    fn is_supported(&self) -> bool;

    /// Ask `child` to exit and wait up to `timeout`.
    ///
    /// Returns `true` if the process exited (or had already exited) within
    /// the window.
    fn attempt(&self, child: &mut Child, timeout: Duration) -> impl Future<Output = bool> + Send;
}

#[cfg(windows)]
pub type PlatformStop = windows::ConsoleCtrlStop;
#[cfg(unix)]
pub type PlatformStop = unix::InterruptStop;
#[cfg(not(any(unix, windows)))]
pub type PlatformStop = Unsupported;

/// Whether the child has already exited or been reaped.
fn already_exited(child: &mut Child) -> bool {
    matches!(child.try_wait(), Ok(Some(_))) || child.id().is_none()
}

async fn wait_for_exit(child: &mut Child, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            debug!("Process exited gracefully: {status}");
            true
        }
        Ok(Err(e)) => {
            debug!("Graceful wait error: {e}");
            false
        }
        Err(_) => {
            debug!("Process did not exit within {}ms", timeout.as_millis());
            false
        }
    }
}

/// Fallback for platforms without cooperative signalling.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

impl GracefulStop for Unsupported {
    fn is_supported(&self) -> bool {
        false
    }

    async fn attempt(&self, child: &mut Child, _timeout: Duration) -> bool {
        already_exited(child)
    }
}

#[cfg(unix)]
pub mod unix {
    use super::{already_exited, wait_for_exit, Child, Duration, GracefulStop};
    use tracing::debug;

    /// Sends `SIGINT`, the same signal an interactive Ctrl-C would deliver.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct InterruptStop;

    impl GracefulStop for InterruptStop {
        fn is_supported(&self) -> bool {
            true
        }

        async fn attempt(&self, child: &mut Child, timeout: Duration) -> bool {
            if already_exited(child) {
                return true;
            }
            let Some(pid) = child.id() else {
                return true;
            };
            let Ok(pid) = libc::pid_t::try_from(pid) else {
                return false;
            };

            // SAFETY: kill(2) has no memory-safety preconditions; the pid is
            // our own unreaped child, so it cannot have been recycled.
            if unsafe { libc::kill(pid, libc::SIGINT) } != 0 {
                debug!(
                    "SIGINT to pid {pid} failed: {}",
                    std::io::Error::last_os_error()
                );
                return false;
            }
            wait_for_exit(child, timeout).await
        }
    }
}

#[cfg(windows)]
pub mod windows {
    use super::{already_exited, wait_for_exit, Child, Duration, GracefulStop};
    use tracing::debug;
    use windows_sys::Win32::System::Console::{
        AttachConsole, FreeConsole, GenerateConsoleCtrlEvent, SetConsoleCtrlHandler,
        ATTACH_PARENT_PROCESS, CTRL_C_EVENT,
    };

    /// Broadcasts `CTRL_C_EVENT` into the child's console session.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ConsoleCtrlStop;

    /// Restores our own Ctrl-C handling, detaches from the borrowed console
    /// and re-attaches to the parent's console if we gave ours up.
    ///
    /// Failures are ignored; this only runs as best-effort cleanup.
    struct ConsoleGuard {
        attached: bool,
        released_own: bool,
    }

    impl Drop for ConsoleGuard {
        fn drop(&mut self) {
            // SAFETY: plain Win32 calls without pointer arguments.
            unsafe {
                if self.attached {
                    FreeConsole();
                }
                if self.released_own {
                    AttachConsole(ATTACH_PARENT_PROCESS);
                }
                SetConsoleCtrlHandler(None, 0);
            }
        }
    }

    /// Send Ctrl-C to the console of `pid`. Returns `false` on any failing step.
    fn send_ctrl_c(pid: u32) -> bool {
        // SAFETY: plain Win32 calls without pointer arguments.
        unsafe {
            // Ignore Ctrl-C ourselves so the broadcast does not stop us too.
            if SetConsoleCtrlHandler(None, 1) == 0 {
                return false;
            }
            // A process holds at most one console; AttachConsole fails with
            // ERROR_ACCESS_DENIED while we still own ours.
            let mut guard = ConsoleGuard {
                attached: false,
                released_own: FreeConsole() != 0,
            };

            if AttachConsole(pid) == 0 {
                debug!(
                    "AttachConsole({pid}) failed: {}",
                    std::io::Error::last_os_error()
                );
                return false;
            }
            guard.attached = true;

            if GenerateConsoleCtrlEvent(CTRL_C_EVENT, 0) == 0 {
                debug!(
                    "GenerateConsoleCtrlEvent failed: {}",
                    std::io::Error::last_os_error()
                );
                return false;
            }
            drop(guard);
        }
        true
    }

    impl GracefulStop for ConsoleCtrlStop {
        fn is_supported(&self) -> bool {
            true
        }

        async fn attempt(&self, child: &mut Child, timeout: Duration) -> bool {
            if already_exited(child) {
                return true;
            }
            let Some(pid) = child.id() else {
                return true;
            };
            if !send_ctrl_c(pid) {
                return false;
            }
            wait_for_exit(child, timeout).await
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn spawn(program: &str, args: &[&str]) -> Child {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn interrupt_stops_sleep() {
        let mut child = spawn("sleep", &["30"]);
        let started = std::time::Instant::now();
        assert!(PlatformStop::default().attempt(&mut child, GRACEFUL_TIMEOUT).await);
        assert!(started.elapsed() < GRACEFUL_TIMEOUT);
    }

    #[tokio::test]
    async fn ignored_interrupt_times_out() {
        let mut child = spawn("sh", &["-c", "trap '' INT; exec sleep 30"]);
        // Give the shell a moment to install the trap.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            !PlatformStop::default()
                .attempt(&mut child, Duration::from_millis(300))
                .await
        );
        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn exited_child_counts_as_graceful() {
        let mut child = spawn("true", &[]);
        child.wait().await.unwrap();
        assert!(PlatformStop::default().attempt(&mut child, GRACEFUL_TIMEOUT).await);
        assert!(Unsupported.attempt(&mut child, GRACEFUL_TIMEOUT).await);
    }

    #[tokio::test]
    async fn unsupported_never_stops_a_live_child() {
        let mut child = spawn("sleep", &["30"]);
        assert!(!Unsupported.is_supported());
        assert!(!Unsupported.attempt(&mut child, GRACEFUL_TIMEOUT).await);
        child.kill().await.unwrap();
    }
}

#[cfg(all(test, windows))]
mod windows_tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;
    use windows_sys::Win32::System::Threading::CREATE_NO_WINDOW;

    #[tokio::test]
    async fn ctrl_c_reaches_a_child_from_a_console_owning_supervisor() {
        // The test harness runs with its own console, like the CLI does.
        let mut child = Command::new("ping")
            .args(["-n", "30", "127.0.0.1"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .creation_flags(CREATE_NO_WINDOW)
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(PlatformStop::default().attempt(&mut child, GRACEFUL_TIMEOUT).await);
    }
}
