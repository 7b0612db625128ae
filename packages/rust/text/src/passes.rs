//! Reduction passes, applied in order.
//!
//! Each pass is a function `&str -> String`.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full reduction pipeline on raw HTML.
pub(crate) fn run_pipeline(html: &str) -> String {
    let mut result = strip_non_content(html);

    result = break_blocks(&result);
    result = strip_tags(&result);
    result = decode_entities(&result);
    result = collapse_whitespace(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Drop head, script, style and noscript blocks with their contents
// ---------------------------------------------------------------------------

fn strip_non_content(html: &str) -> String {
    static BLOCK_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        ["head", "noscript", "script", "style"]
            .iter()
            .map(|tag| {
                Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("valid regex")
            })
            .collect()
    });

    let mut out = html.to_string();
    for re in BLOCK_RES.iter() {
        out = re.replace_all(&out, "").into_owned();
    }
    out
}

// ---------------------------------------------------------------------------
// Pass 2: Newline at every block-level tag boundary
// ---------------------------------------------------------------------------

fn break_blocks(html: &str) -> String {
    static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)</?(?:p|div|section|article|header|footer|main|aside|ul|ol|li|table|thead|tbody|tr|td|th|pre|code|blockquote|h[1-6]|br)\b[^>]*>",
        )
        .expect("valid regex")
    });

    BLOCK_TAG_RE.replace_all(html, "\n").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 3: Remove remaining tags
// ---------------------------------------------------------------------------

fn strip_tags(html: &str) -> String {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

    TAG_RE.replace_all(html, "").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 4: Decode common entities
// ---------------------------------------------------------------------------

/// `&amp;` goes last so `&amp;lt;` stays `&lt;`.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ---------------------------------------------------------------------------
// Pass 5: Collapse whitespace
// ---------------------------------------------------------------------------

/// Runs of spaces/tabs become one space, lines are trimmed, and at most one
/// blank line separates blocks.
fn collapse_whitespace(text: &str) -> String {
    static INLINE_WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[\t\x0C\r ]+").expect("valid regex"));
    static EDGE_WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^ +| +$").expect("valid regex"));
    static MULTI_NL_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let out = INLINE_WS_RE.replace_all(text, " ");
    let out = EDGE_WS_RE.replace_all(&out, "");
    let out = MULTI_NL_RE.replace_all(&out, "\n\n");
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_is_not_confused_with_header() {
        let out = strip_non_content("<head><title>x</title></head><header>Keep</header>");
        assert_eq!(out, "<header>Keep</header>");
    }

    #[test]
    fn pre_is_not_a_paragraph() {
        assert_eq!(break_blocks("<pre class=\"x\">a</pre>"), "\na\n");
        assert_eq!(break_blocks("<span>a</span>"), "<span>a</span>");
    }

    #[test]
    fn entities_decode_once() {
        assert_eq!(decode_entities("Tom &amp; Jerry &amp;lt;3"), "Tom & Jerry &lt;3");
        assert_eq!(decode_entities("&quot;hi&quot; &#39;there&#39;"), "\"hi\" 'there'");
    }

    #[test]
    fn whitespace_collapses() {
        assert_eq!(collapse_whitespace("  a \t b \n\n\n\n  c  "), "a b\n\nc");
    }
}
