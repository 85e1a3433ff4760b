//! Request identity: URL canonicalization and cache key generation.
//!
//! Two requests are the same cache entry iff their method and canonical
//! URL match. Only GET requests ever reach the store, but the method is
//! part of the key regardless so the identity stays self-describing.

use sha2::{Digest, Sha256};

use crate::Error;

/// Canonicalize a URL string for consistent cache addressing.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Lowercase the host
/// 3. Remove fragment (#...)
/// 4. Keep query string intact (do not reorder)
///
/// Only http and https URLs have a cache identity; anything else is
/// rejected here and must be filtered out before lookup.
pub fn canonicalize(input: &str) -> Result<url::Url, Error> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".into()));
    }

    let mut parsed = url::Url::parse(trimmed).map_err(|e| Error::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(Error::InvalidUrl(format!("unsupported scheme: {scheme}"))),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        parsed
            .set_host(Some(&lowered))
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Compute the cache key for a request identity.
pub fn request_key(method: &str, url: &url::Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_str().as_bytes());
    hex::encode(hasher.finalize())
}
