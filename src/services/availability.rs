//! Reachability probe for the userscript host environment.
//!
//! The sync bridge answers data requests only when its host environment is
//! actually reachable; otherwise callers get an explicit "userscript not
//! available" error instead of a silent timeout.

use std::time::Duration;

/// Probe timeout. Both errors and timeouts count as "not available"; the
/// underlying cause is never propagated past the boolean.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Seam for the availability check so tests can inject a stub.
pub trait AvailabilityProbe: Send + Sync {
    fn is_available(&self) -> bool;
}

/// Probe that issues a short-timeout HTTP GET against the host endpoint.
pub struct HttpProbe {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpProbe {
    /// Creates a probe against `url`.
    ///
    /// # Errors
    /// Returns `reqwest::Error` if the HTTP client cannot be constructed.
    pub fn new(url: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

impl AvailabilityProbe for HttpProbe {
    fn is_available(&self) -> bool {
        self.client
            .get(&self.url)
            .send()
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }
}
