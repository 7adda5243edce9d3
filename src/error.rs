//! Error types for the supervisor and its configuration layer.
//!
//! [`ServiceError`] is the one error category that crosses the public
//! boundary of [`LocalService`](crate::LocalService): every variant means
//! "the local server has not been started". Probe transport failures and
//! shutdown signal failures never show up here; they are logged and resolved
//! internally by retrying or by killing the process.

use std::path::PathBuf;
use std::time::Duration;

/// The local server could not be started.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The OS refused or failed to create the child process.
    #[error(
        "The local appium server has not been started. The given executable: {} Arguments: {arguments}. {source}",
        .executable.display()
    )]
    Launch {
        executable: PathBuf,
        arguments: String,
        #[source]
        source: std::io::Error,
    },

    /// The process launched but never answered its status endpoint in time.
    #[error(
        "The local appium server has not been started. The given executable: {} Arguments: {arguments}. Time {} ms for the service starting has been expired!",
        .executable.display(),
        .timeout.as_millis()
    )]
    ReadinessTimeout {
        executable: PathBuf,
        arguments: String,
        timeout: Duration,
    },

    /// A base-path flag was the last token of the argument string.
    #[error("The local appium server has not been started. Argument `{flag}` is missing its value")]
    MissingArgumentValue { flag: String },

    /// The status URL composed from the configuration does not parse.
    #[error("The local appium server has not been started. Invalid status URL: {0}")]
    InvalidStatusUrl(#[from] url::ParseError),

    /// The HTTP client used for readiness probing could not be built.
    #[error("The local appium server has not been started. Probe client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl ServiceError {
    /// Returns `true` if the child process could not be launched at all.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, ServiceError::Launch { .. })
    }

    /// Returns `true` if the child launched but never became ready.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::ReadinessTimeout { .. })
    }
}

/// Errors raised while loading the file/env configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{var} is not a valid IP address: {value}")]
    InvalidAddress { var: &'static str, value: String },

    #[error("{var} is not a valid number: {value}")]
    InvalidNumber { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_error_embeds_executable_and_arguments() {
        let err = ServiceError::Launch {
            executable: PathBuf::from("/opt/node/bin/node"),
            arguments: "main.js --port 4723".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        let msg = err.to_string();
        assert!(msg.contains("/opt/node/bin/node"));
        assert!(msg.contains("main.js --port 4723"));
        assert!(err.is_launch_failure());
        assert!(!err.is_timeout());
    }

    #[test]
    fn timeout_error_reports_milliseconds() {
        let err = ServiceError::ReadinessTimeout {
            executable: PathBuf::from("node"),
            arguments: String::new(),
            timeout: Duration::from_secs(3),
        };
        assert!(err.to_string().contains("Time 3000 ms"));
        assert!(err.is_timeout());
    }
}
