//! Mapping between blob-store keys and the public URLs stored on
//! `ReportedImage` rows.
//!
//! The key is the last path segment of the URL with the query string dropped
//! and `%2F`/`%20` un-escaped. Existing deployments store URLs in this shape,
//! so the rule must not be widened to general percent-decoding.

/// Derives the storage key from a public image URL.
///
/// Returns `None` when the URL has no usable final segment.
pub fn storage_key_from_url(image_url: &str) -> Option<String> {
    let last = image_url.rsplit('/').next()?;
    let path = last.split('?').next()?;
    if path.is_empty() {
        return None;
    }
    Some(path.replace("%2F", "/").replace("%20", " "))
}

/// Builds the public URL for a storage key under `url_prefix`. Inverse of
/// [`storage_key_from_url`].
pub fn url_for_storage_key(url_prefix: &str, key: &str) -> String {
    let escaped = key.replace(' ', "%20").replace('/', "%2F");
    format!("{}/{}", url_prefix.trim_end_matches('/'), escaped)
}
