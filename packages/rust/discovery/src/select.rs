//! Candidate selection among discovered links.
//!
//! Links are shuffled, then walked in order:
//! - an extensionless URL (a clean route) is accepted;
//! - a known binary/media/archive extension is skipped;
//! - a document extension is accepted and becomes the preferred extension,
//!   after which only URLs with exactly that extension are accepted;
//! - any other extension is skipped.
//!
//! The homepage always comes first in the result.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;
use url::Url;

use crate::normalize_url;

/// Extensions never worth summarizing.
pub const BAD_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "mp3", "wav", "flac", "pdf", "png", "jpg", "jpeg", "gif",
    "svg", "ico", "webp", "css", "js", "json", "xml", "zip", "rar", "7z", "gz", "tar",
];

/// Extensions of text documents.
pub const DOC_EXTENSIONS: &[&str] = &["html", "htm", "php", "asp", "aspx", "md", "txt"];

/// Lower-cased extension of the last non-empty path segment.
///
/// A leading dot (`/.env`) does not count as an extension.
pub fn path_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path().split('/').filter(|s| !s.is_empty()).last()?;
    let dot = last.rfind('.')?;
    if dot == 0 {
        return None;
    }
    Some(last[dot + 1..].to_ascii_lowercase())
}

/// Pick up to `max_candidates` links to summarize and prepend `homepage`.
///
/// The result is normalized and de-duplicated, so it never holds more than
/// `max_candidates + 1` URLs.
pub fn select_targets<R: Rng + ?Sized>(
    homepage: &str,
    links: &[String],
    max_candidates: usize,
    rng: &mut R,
) -> Vec<String> {
    let mut pool: Vec<&String> = links.iter().filter(|l| !l.is_empty()).collect();
    pool.shuffle(rng);

    let mut selected: Vec<&str> = Vec::new();
    let mut preferred: Option<String> = None;
    for url in pool {
        if selected.len() >= max_candidates {
            break;
        }
        let ext = path_extension(url);

        if let Some(pref) = &preferred {
            if ext.as_deref() == Some(pref.as_str()) {
                selected.push(url);
            }
            continue;
        }

        match ext {
            None => selected.push(url),
            Some(e) if BAD_EXTENSIONS.contains(&e.as_str()) => {}
            Some(e) if DOC_EXTENSIONS.contains(&e.as_str()) => {
                selected.push(url);
                preferred = Some(e);
            }
            Some(_) => {}
        }
    }

    let mut seen = HashSet::new();
    std::iter::once(homepage)
        .chain(selected)
        .map(normalize_url)
        .filter(|u| seen.insert(u.clone()))
        .collect()
}
