//! HTML-to-plain-text reduction for page summarization.
//!
//! The model only needs the words on a page, so instead of a full Markdown
//! conversion the HTML goes through a short series of regex passes: drop
//! non-content blocks, turn block-level tag boundaries into newlines, remove
//! every remaining tag, decode common entities and collapse whitespace.

mod passes;

use tracing::{debug, instrument};

/// Reduce an HTML document to plain text.
///
/// Works on fragments and malformed markup alike; returns an empty string
/// when nothing readable is left.
#[instrument(skip_all, fields(html_len = html.len()))]
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let text = passes::run_pipeline(html);
    debug!(text_len = text.len(), "html reduced to text");
    text
}

/// The first `max_chars` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html>
<head><title>Acme Roofing</title><style>body { color: red }</style></head>
<body>
  <header><nav><a href="/">Home</a></nav></header>
  <main>
    <h1>Acme Roofing &amp; Gutters</h1>
    <p>Family owned since 1998.<br/>Serving   Austin&nbsp;TX.</p>
    <ul><li>Roof repair</li><li>Inspections</li></ul>
    <script>window.track("visit");</script>
    <noscript>Enable JS</noscript>
  </main>
</body>
</html>"#;

    #[test]
    fn reduces_page_to_text() {
        let text = html_to_text(PAGE);
        assert!(text.contains("Acme Roofing & Gutters"));
        assert!(text.contains("Family owned since 1998.\nServing Austin TX."));
        assert!(text.contains("Roof repair"));
        assert!(text.contains("Inspections"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains("track"));
        assert!(!text.contains("Enable JS"));
        assert!(!text.contains("<"));
        // title lives in <head>
        assert!(!text.starts_with("Acme Roofing\n"));
    }

    #[test]
    fn no_long_blank_runs() {
        let text = html_to_text(PAGE);
        assert!(!text.contains("\n\n\n"));
        assert_eq!(text, text.trim());
    }

    #[test]
    fn empty_input() {
        assert_eq!(html_to_text(""), "");
        assert_eq!(html_to_text("  \n "), "");
        assert_eq!(html_to_text("<script>only()</script>"), "");
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
        let long = "ü".repeat(7_000);
        assert_eq!(truncate_chars(&long, 6_000).chars().count(), 6_000);
    }
}
