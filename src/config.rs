//! Service configuration and file/env loading.
//!
//! [`ServiceConfig`] is the immutable bundle the supervisor consumes. It is
//! either built directly from resolved values ([`ServiceConfig::new`]) or via
//! [`ServiceConfigBuilder`], which fills in defaults and composes the
//! argument string.
//!
//! The command-line tool resolves a [`Config`] in order of precedence
//! (highest wins):
//!
//! 1. **Environment variables** — `APPIUM_EXECUTABLE`, `APPIUM_ADDRESS`,
//!    `APPIUM_PORT`, `APPIUM_READINESS_TIMEOUT_MS`
//! 2. **Config file** — path via `--config <path>`, or `appium-service.toml`
//!    in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! ```toml
//! [service]
//! executable = "node"
//! main_script = "/usr/lib/node_modules/appium/build/lib/main.js"
//! arguments = "--base-path /wd/hub"
//! address = "0.0.0.0"
//! port = 4723
//! readiness_timeout_ms = 120000
//!
//! [service.env]
//! ANDROID_HOME = "/opt/android-sdk"
//!
//! [logging]
//! level = "info"
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::service::status::tokenize;

/// Port the Appium server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 4723;

/// The "any address" bind sentinel.
pub const DEFAULT_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Default readiness deadline (2 minutes).
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(120);

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "appium-service.toml";

/// Fully resolved launch settings for one supervised server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    executable: PathBuf,
    arguments: String,
    bind_address: IpAddr,
    port: u16,
    readiness_timeout: Duration,
    environment: BTreeMap<String, Option<String>>,
}

impl ServiceConfig {
    /// Create a configuration from already resolved values.
    ///
    /// `environment` values of `None` are passed to the child as empty strings.
    pub fn new(
        executable: impl Into<PathBuf>,
        arguments: impl Into<String>,
        bind_address: IpAddr,
        port: u16,
        readiness_timeout: Duration,
        environment: BTreeMap<String, Option<String>>,
    ) -> Self {
        Self {
            executable: executable.into(),
            arguments: arguments.into(),
            bind_address,
            port,
            readiness_timeout,
            environment,
        }
    }

    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Runtime binary that hosts the server (typically Node.js).
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Raw argument text passed to the child.
    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    pub fn bind_address(&self) -> IpAddr {
        self.bind_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn readiness_timeout(&self) -> Duration {
        self.readiness_timeout
    }

    /// Environment overrides merged into the inherited environment.
    pub fn environment(&self) -> &BTreeMap<String, Option<String>> {
        &self.environment
    }

    /// Overrides with `None` values replaced by the empty string.
    pub fn resolved_environment(&self) -> impl Iterator<Item = (&str, &str)> {
        self.environment
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref().unwrap_or("")))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfigBuilder::default().build()
    }
}

/// Builder for [`ServiceConfig`] with Appium-friendly defaults.
///
/// The composed argument string is
/// `[main_script] --address <ip> --port <port> [extra args...]`.
#[derive(Debug, Clone)]
pub struct ServiceConfigBuilder {
    executable: PathBuf,
    main_script: Option<PathBuf>,
    extra_args: Vec<String>,
    bind_address: IpAddr,
    port: u16,
    readiness_timeout: Duration,
    environment: BTreeMap<String, Option<String>>,
}

impl Default for ServiceConfigBuilder {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("node"),
            main_script: None,
            extra_args: Vec::new(),
            bind_address: DEFAULT_ADDRESS,
            port: DEFAULT_PORT,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            environment: BTreeMap::new(),
        }
    }
}

impl ServiceConfigBuilder {
    #[must_use]
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = path.into();
        self
    }

    /// Script handed to the executable as its first argument.
    #[must_use]
    pub fn main_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.main_script = Some(path.into());
        self
    }

    /// Append a flag and an optional value after the address/port pair.
    #[must_use]
    pub fn argument(mut self, flag: impl Into<String>, value: Option<&str>) -> Self {
        self.extra_args.push(flag.into());
        if let Some(v) = value {
            self.extra_args.push(v.to_string());
        }
        self
    }

    /// Append raw argument text, split on spaces.
    #[must_use]
    pub fn arguments(mut self, raw: &str) -> Self {
        self.extra_args
            .extend(tokenize(raw).into_iter().map(String::from));
        self
    }

    #[must_use]
    pub fn bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), Some(value.into()));
        self
    }

    /// Set a variable to the empty string in the child.
    #[must_use]
    pub fn env_empty(mut self, key: impl Into<String>) -> Self {
        self.environment.insert(key.into(), None);
        self
    }

    pub fn build(self) -> ServiceConfig {
        let mut tokens: Vec<String> = Vec::with_capacity(self.extra_args.len() + 5);
        if let Some(script) = &self.main_script {
            tokens.push(script.to_string_lossy().into_owned());
        }
        tokens.push("--address".into());
        tokens.push(self.bind_address.to_string());
        tokens.push("--port".into());
        tokens.push(self.port.to_string());
        tokens.extend(self.extra_args);

        ServiceConfig {
            executable: self.executable,
            arguments: tokens.join(" "),
            bind_address: self.bind_address,
            port: self.port,
            readiness_timeout: self.readiness_timeout,
            environment: self.environment,
        }
    }
}

// --- File configuration ---

/// Top-level configuration for the command-line tool, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[service]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSection {
    /// Runtime binary (default `node`, resolved through `PATH`).
    #[serde(default = "default_executable")]
    pub executable: String,
    /// Appium entry script passed as the first argument.
    pub main_script: Option<String>,
    /// Extra raw arguments appended after `--address`/`--port`.
    #[serde(default)]
    pub arguments: String,
    /// Bind address (default `0.0.0.0`).
    #[serde(default = "default_address")]
    pub address: IpAddr,
    /// Bind port (default 4723).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Readiness deadline in milliseconds (default 120 000).
    #[serde(default = "default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,
    /// Environment overrides for the child process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_executable() -> String {
    "node".to_string()
}
fn default_address() -> IpAddr {
    DEFAULT_ADDRESS
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
#[allow(clippy::cast_possible_truncation)]
fn default_readiness_timeout_ms() -> u64 {
    DEFAULT_READINESS_TIMEOUT.as_millis() as u64
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            main_script: None,
            arguments: String::new(),
            address: default_address(),
            port: default_port(),
            readiness_timeout_ms: default_readiness_timeout_ms(),
            env: BTreeMap::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise
    /// `appium-service.toml` in the current directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `APPIUM_*` overrides using `lookup` as the environment.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(exe) = lookup("APPIUM_EXECUTABLE") {
            self.service.executable = exe;
        }
        if let Some(addr) = lookup("APPIUM_ADDRESS") {
            self.service.address = addr.parse().map_err(|_| ConfigError::InvalidAddress {
                var: "APPIUM_ADDRESS",
                value: addr,
            })?;
        }
        if let Some(port) = lookup("APPIUM_PORT") {
            self.service.port = port.parse().map_err(|_| ConfigError::InvalidNumber {
                var: "APPIUM_PORT",
                value: port,
            })?;
        }
        if let Some(ms) = lookup("APPIUM_READINESS_TIMEOUT_MS") {
            self.service.readiness_timeout_ms =
                ms.parse().map_err(|_| ConfigError::InvalidNumber {
                    var: "APPIUM_READINESS_TIMEOUT_MS",
                    value: ms,
                })?;
        }
        Ok(())
    }

    /// Turn the `[service]` table into the supervisor's configuration.
    pub fn service_config(&self) -> ServiceConfig {
        let s = &self.service;
        let mut builder = ServiceConfig::builder()
            .executable(&s.executable)
            .bind_address(s.address)
            .port(s.port)
            .readiness_timeout(Duration::from_millis(s.readiness_timeout_ms))
            .arguments(&s.arguments);
        if let Some(script) = &s.main_script {
            builder = builder.main_script(script);
        }
        for (k, v) in &s.env {
            builder = builder.env(k, v);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn builder_defaults() {
        let cfg = ServiceConfig::builder().build();
        assert_eq!(cfg.executable(), Path::new("node"));
        assert_eq!(cfg.bind_address(), DEFAULT_ADDRESS);
        assert_eq!(cfg.port(), 4723);
        assert_eq!(cfg.readiness_timeout(), Duration::from_secs(120));
        assert_eq!(cfg.arguments(), "--address 0.0.0.0 --port 4723");
        assert!(cfg.environment().is_empty());
    }

    #[test]
    fn builder_composes_arguments_in_order() {
        let cfg = ServiceConfig::builder()
            .main_script("/opt/appium/main.js")
            .port(4800)
            .argument("--base-path", Some("/wd/hub"))
            .argument("--relaxed-security", None)
            .arguments("--log-level  debug")
            .build();
        assert_eq!(
            cfg.arguments(),
            "/opt/appium/main.js --address 0.0.0.0 --port 4800 --base-path /wd/hub \
             --relaxed-security --log-level debug"
        );
    }

    #[test]
    fn raw_arguments_split_like_the_status_resolver() {
        let raw = " --base-path  /wd/hub   --relaxed-security ";
        let cfg = ServiceConfig::builder().arguments(raw).build();
        let expected = format!("--address 0.0.0.0 --port 4723 {}", tokenize(raw).join(" "));
        assert_eq!(cfg.arguments(), expected);
        assert_eq!(
            crate::service::status::base_path(cfg.arguments()).unwrap(),
            "/wd/hub"
        );
    }

    #[test]
    fn empty_env_values_resolve_to_empty_string() {
        let cfg = ServiceConfig::builder()
            .env("ANDROID_HOME", "/sdk")
            .env_empty("APPIUM_HOME")
            .build();
        let env: HashMap<&str, &str> = cfg.resolved_environment().collect();
        assert_eq!(env["ANDROID_HOME"], "/sdk");
        assert_eq!(env["APPIUM_HOME"], "");
    }

    #[test]
    fn load_file_with_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[service]
executable = "/usr/bin/node"
arguments = "--base-path /wd/hub"
port = 5000

[service.env]
ANDROID_HOME = "/opt/sdk"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.service.executable, "/usr/bin/node");
        assert_eq!(config.service.address, DEFAULT_ADDRESS);
        assert_eq!(config.service.readiness_timeout_ms, 120_000);
        assert_eq!(config.logging.level, "info");

        let svc = config.service_config();
        assert_eq!(svc.port(), 5000);
        assert_eq!(
            svc.arguments(),
            "--address 0.0.0.0 --port 5000 --base-path /wd/hub"
        );
        assert_eq!(
            svc.environment().get("ANDROID_HOME"),
            Some(&Some("/opt/sdk".to_string()))
        );
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load(Some(Path::new("/nonexistent/appium-service.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[service\nport = ").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let vars: HashMap<&str, &str> = [
            ("APPIUM_PORT", "4999"),
            ("APPIUM_ADDRESS", "127.0.0.1"),
            ("APPIUM_READINESS_TIMEOUT_MS", "1500"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|k| vars.get(k).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.service.port, 4999);
        assert_eq!(config.service.address, IpAddr::from([127, 0, 0, 1]));
        assert_eq!(config.service.readiness_timeout_ms, 1500);
        assert_eq!(config.service.executable, "node");
    }

    #[test]
    fn bad_env_values_are_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(|k| (k == "APPIUM_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { var: "APPIUM_PORT", .. }));

        let err = config
            .apply_env(|k| (k == "APPIUM_ADDRESS").then(|| "localhost".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { .. }));
    }
}
