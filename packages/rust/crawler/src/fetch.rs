//! HTTP implementation of [`PageSource`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use leadsmith_shared::{FetchConfig, LeadsmithError, Result};

use crate::PageSource;
use crate::ssrf::is_ssrf_target;

/// Maximum number of redirects followed per request.
const MAX_REDIRECTS: usize = 5;

/// Fetches page HTML with a per-request timeout, a fixed number of attempts
/// with a pause between them, and a cap on the bytes read from the body.
pub struct HttpFetcher {
    client: Client,
    max_bytes: usize,
    attempts: u32,
    backoff: Duration,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| LeadsmithError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
            attempts: config.attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
            allow_localhost: false,
        })
    }

    /// Allow fetching localhost/private IPs (for integration tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// One request: non-2xx is an error, the body is read chunk by chunk
    /// until it ends or the byte cap is reached.
    async fn fetch_once(&self, url: &Url) -> Result<String> {
        let mut response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| LeadsmithError::Network(format!("fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LeadsmithError::Network(format!(
                "fetch {url}: HTTP {}",
                status.as_u16()
            )));
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| LeadsmithError::Network(format!("fetch {url}: body read failed: {e}")))?
        {
            body.extend_from_slice(&chunk);
            if body.len() >= self.max_bytes {
                debug!(%url, bytes = body.len(), "body cap reached");
                body.truncate(self.max_bytes);
                break;
            }
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    #[instrument(skip(self), fields(attempts = self.attempts))]
    async fn fetch_html(&self, url: &str) -> Result<String> {
        let parsed =
            Url::parse(url).map_err(|e| LeadsmithError::Network(format!("bad url {url}: {e}")))?;
        if !self.allow_localhost && is_ssrf_target(&parsed) {
            return Err(LeadsmithError::Network(format!(
                "refusing to fetch private or non-http target: {url}"
            )));
        }

        let mut last_err = None;
        for attempt in 1..=self.attempts {
            match self.fetch_once(&parsed).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!(%url, attempt, error = %e, "page fetch failed");
                    last_err = Some(e);
                    if attempt < self.attempts {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| LeadsmithError::Network(format!("fetch {url} failed"))))
    }
}
