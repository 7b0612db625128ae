//! Link discovery and candidate-page selection.
//!
//! Before summarizing a company website, Leadsmith fetches the homepage,
//! harvests its same-host links and picks a few internal pages worth
//! summarizing alongside the homepage itself.

mod select;

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use leadsmith_crawler::PageSource;

pub use select::{BAD_EXTENSIONS, DOC_EXTENSIONS, path_extension, select_targets};

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Fetch `homepage` and return its same-host links.
///
/// A failed homepage fetch is not an error: discovery then yields nothing
/// and the homepage alone is summarized.
#[instrument(skip_all, fields(homepage = %homepage))]
pub async fn discover_links(pages: &dyn PageSource, homepage: &str) -> Vec<String> {
    let html = match pages.fetch_html(homepage).await {
        Ok(html) => html,
        Err(e) => {
            warn!(error = %e, "homepage fetch failed, continuing without discovered links");
            return Vec::new();
        }
    };

    let links = extract_internal_links(&html, homepage);
    info!(count = links.len(), "internal links discovered");
    links
}

/// All `<a href>` targets of `html` that resolve to the same hostname as
/// `home`, fragment stripped, de-duplicated in document order.
///
/// Anchors and `mailto:`, `tel:`, `javascript:` links are skipped.
pub fn extract_internal_links(html: &str, home: &str) -> Vec<String> {
    let Ok(base) = Url::parse(home) else {
        debug!(home, "unparseable homepage url");
        return Vec::new();
    };
    let doc = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for el in doc.select(&LINK_SELECTOR) {
        let Some(href) = el.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with("javascript:")
        {
            continue;
        }

        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        if resolved.host_str() != base.host_str() {
            continue;
        }
        resolved.set_fragment(None);

        let link = resolved.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }
    links
}

/// Canonical form used for de-duplication: parsed and fragment stripped.
/// Strings that do not parse are kept as they are.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw.to_string(),
    }
}
