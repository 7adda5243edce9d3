//! Status endpoint resolution.
//!
//! The supervised server answers its health check on
//! `http://<host>:<port>[<base-path>]/status`. The base path is not part of
//! the structured configuration; it is pulled out of the raw argument string
//! (`--base-path <p>` or `-pa <p>`) on every call.

use std::net::{IpAddr, SocketAddr};

use url::Url;

use crate::error::ServiceError;

/// Base path the server uses when no routing prefix is configured.
pub const DEFAULT_BASE_PATH: &str = "/";

/// Path segment appended to the base path for the health check.
pub const STATUS_SUFFIX: &str = "/status";

/// Long and short spellings of the routing-prefix flag, in lookup order.
const BASE_PATH_FLAGS: [&str; 2] = ["--base-path", "-pa"];

/// Split an argument string on single spaces, dropping empty tokens.
pub fn tokenize(arguments: &str) -> Vec<&str> {
    arguments.split(' ').filter(|t| !t.is_empty()).collect()
}

/// Extract the routing prefix from an argument string.
///
/// Returns [`DEFAULT_BASE_PATH`] when neither flag is present, and
/// [`ServiceError::MissingArgumentValue`] when a flag is the last token.
pub fn base_path(arguments: &str) -> Result<&str, ServiceError> {
    let tokens = tokenize(arguments);
    for flag in BASE_PATH_FLAGS {
        if let Some(idx) = tokens.iter().position(|t| *t == flag) {
            return tokens
                .get(idx + 1)
                .copied()
                .ok_or_else(|| ServiceError::MissingArgumentValue {
                    flag: flag.to_string(),
                });
        }
    }
    Ok(DEFAULT_BASE_PATH)
}

/// Informational base URL of the server: `http://<bind-address>:<port>/`.
pub fn service_url(bind_address: IpAddr, port: u16) -> Result<Url, ServiceError> {
    Ok(Url::parse(&format!(
        "http://{}/",
        SocketAddr::new(bind_address, port)
    ))?)
}

/// Resolve the URL the readiness prober polls.
///
/// Loopback and unspecified ("any address") binds are rewritten to
/// `localhost`, since the supervisor always runs on the same machine.
pub fn status_url(arguments: &str, bind_address: IpAddr, port: u16) -> Result<Url, ServiceError> {
    let base = base_path(arguments)?;

    let authority = if bind_address.is_loopback() || bind_address.is_unspecified() {
        format!("localhost:{port}")
    } else {
        SocketAddr::new(bind_address, port).to_string()
    };

    let prefix = if base == DEFAULT_BASE_PATH {
        ""
    } else {
        base
    };
    let slash = if prefix.is_empty() || prefix.starts_with('/') {
        ""
    } else {
        "/"
    };

    Ok(Url::parse(&format!(
        "http://{authority}{slash}{prefix}{STATUS_SUFFIX}"
    ))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    const ANY: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    const LAN: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));

    #[test]
    fn default_base_path_has_no_extra_segment() {
        let url = status_url("main.js --port 4723", LOOPBACK, 4723).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4723/status");
    }

    #[test]
    fn long_base_path_flag_precedes_status() {
        let url = status_url("main.js --base-path /wd/hub --port 4723", LAN, 4723).unwrap();
        assert_eq!(url.as_str(), "http://192.168.1.20:4723/wd/hub/status");
        assert_eq!(url.as_str().matches("/wd/hub").count(), 1);
    }

    #[test]
    fn short_base_path_flag_is_recognized() {
        let url = status_url("-pa /custom", ANY, 4800).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4800/custom/status");
    }

    #[test]
    fn long_flag_wins_over_short_flag() {
        assert_eq!(base_path("-pa /short --base-path /long").unwrap(), "/long");
    }

    #[test]
    fn explicit_default_base_path_is_omitted() {
        let url = status_url("--base-path /", LOOPBACK, 4723).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4723/status");
    }

    #[test]
    fn relative_base_path_gets_a_leading_slash() {
        let url = status_url("--base-path wd/hub", LOOPBACK, 4723).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4723/wd/hub/status");
    }

    #[test]
    fn loopback_and_any_address_map_to_localhost() {
        for ip in [
            LOOPBACK,
            ANY,
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        ] {
            let url = status_url("", ip, 4723).unwrap();
            assert_eq!(url.host_str(), Some("localhost"), "bind address {ip}");
        }
    }

    #[test]
    fn non_loopback_ipv6_is_bracketed() {
        let ip: IpAddr = "fd00::1".parse().unwrap();
        let url = status_url("", ip, 4723).unwrap();
        assert_eq!(url.as_str(), "http://[fd00::1]:4723/status");
    }

    #[test]
    fn trailing_flag_without_value_fails_fast() {
        let err = status_url("main.js --base-path", LOOPBACK, 4723).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::MissingArgumentValue { ref flag } if flag == "--base-path"
        ));
        assert!(base_path("-pa").is_err());
    }

    #[test]
    fn single_token_arguments() {
        assert_eq!(tokenize("main.js"), vec!["main.js"]);
        assert_eq!(base_path("main.js").unwrap(), DEFAULT_BASE_PATH);
    }

    #[test]
    fn resolution_is_repeatable() {
        let args = "main.js -pa /wd/hub";
        let first = status_url(args, ANY, 4723).unwrap();
        let second = status_url(args, ANY, 4723).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn service_url_keeps_bind_address() {
        assert_eq!(
            service_url(ANY, 4723).unwrap().as_str(),
            "http://0.0.0.0:4723/"
        );
        assert_eq!(
            service_url(LAN, 8080).unwrap().as_str(),
            "http://192.168.1.20:8080/"
        );
    }
}
