/// file: src/catalog.rs
/// description: Catalog-number classification and slug derivation.
/// Only queries that look like a structured catalog identifier are eligible
/// for automatic resolution; free-text keyword phrases are always handed
/// back to the source site's own search.
use std::sync::LazyLock;

use regex::Regex;

/// 0-3 leading letters, 3-7 digits, up to 10 trailing alphanumerics/hyphens.
static CATALOG_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]{0,3}[0-9]{3,7}[A-Za-z0-9-]{0,10}$").expect("catalog code pattern")
});

const MAX_IDENTIFIER_LEN: usize = 24;

/// Does `text` look like a catalog number ("T3189") rather than a keyword
/// phrase ("qPCR master mix")? Pure, no I/O.
pub fn is_identifier_like(text: &str) -> bool {
    if text.is_empty() || text.len() > MAX_IDENTIFIER_LEN {
        return false;
    }
    if text.chars().any(char::is_whitespace) {
        return false;
    }
    CATALOG_CODE.is_match(text)
}

// ---------------------------------------------------------------------------
// Slugs
// ---------------------------------------------------------------------------

/// Lowercase, "&" → "and", any other non-alphanumeric run → single hyphen,
/// leading/trailing hyphens trimmed.
pub fn slugify(title: &str) -> String {
    let replaced = title.replace('&', " and ");
    let mut out = String::with_capacity(replaced.len());
    let mut pending_hyphen = false;
    for ch in replaced.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    out
}

/// Deterministic product identity: last path segment of the source URL,
/// file extension stripped, slugified.
pub fn slug_from_url(source_url: &str) -> String {
    let path = source_url
        .split(['?', '#'])
        .next()
        .unwrap_or(source_url)
        .trim_end_matches('/');
    let last = path.rsplit('/').next().unwrap_or(path);
    let stem = match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            stem
        }
        _ => last,
    };
    slugify(stem)
}
