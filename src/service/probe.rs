//! Readiness probing against the server's status endpoint.
//!
//! The probe loop retries immediately after every failed attempt; the only
//! brake is the overall deadline, checked before each request. Transport
//! errors are expected while the server is still booting and never escape.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;
use url::Url;

/// Per-request ceiling of the shared probing client (2 minutes).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Probe window used by liveness checks and by `start` on an existing handle.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_millis(500);

/// Build the HTTP client the supervisor reuses for every probe.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .no_proxy()
        .build()
}

/// Poll `url` until it answers with a 2xx status or `timeout` elapses.
///
/// Each attempt is also capped at the time left before the deadline.
pub async fn probe(client: &reqwest::Client, url: &Url, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u64;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            trace!("Status probe of {url} gave up after {attempts} attempt(s)");
            return false;
        }
        attempts += 1;

        match client
            .get(url.clone())
            .timeout(remaining.min(REQUEST_TIMEOUT))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                trace!("Status probe of {url} succeeded after {attempts} attempt(s)");
                return true;
            }
            Ok(resp) => trace!("Status probe of {url}: HTTP {}", resp.status()),
            Err(e) => trace!("Status probe of {url} failed: {e}"),
        }
    }
}
