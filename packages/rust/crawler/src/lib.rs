//! Website content fetching.
//!
//! This crate provides:
//! - [`PageSource`]: the seam enrichment code fetches pages through
//! - [`HttpFetcher`]: timeout-bounded, retrying, byte-capped HTTP implementation
//! - [`ssrf`]: refusal of non-HTTP schemes and private/loopback targets

pub mod fetch;
pub mod ssrf;

use async_trait::async_trait;
use leadsmith_shared::Result;

pub use fetch::HttpFetcher;

/// Something that can return the HTML body behind a URL.
///
/// Implementations decide on transport, retries and limits. Errors are
/// reported as [`leadsmith_shared::LeadsmithError::Network`] (or another
/// non-model variant) so callers classify them as scrape failures.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String>;
}
