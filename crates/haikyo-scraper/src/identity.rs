use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static DETAIL_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:s/(\d+)\.html|explorer/(\d+)(?:/|$))").expect("valid regex")
});

/// Source-assigned id from a detail URL, if the URL carries one.
#[must_use]
pub fn source_id(url: &str) -> Option<String> {
    let caps = DETAIL_ID_RE.captures(url)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_owned())
}

#[must_use]
pub fn is_detail_url(url: &str) -> bool {
    source_id(url).is_some()
}

/// Stable id for a location page.
///
/// Uses the site's numeric id when present, otherwise the first 16 hex
/// characters of the SHA-256 of the URL.
#[must_use]
pub fn location_id(url: &str) -> String {
    if let Some(id) = source_id(url) {
        return id;
    }
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    digest[..16].to_owned()
}
