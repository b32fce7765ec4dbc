//! # URL Normalization
//!
//! Canonicalizes remote URLs before any index lookup or network call.
//! Some deployments serve media metadata pointing at hosts that no
//! longer exist (stale CDN domains, pre-migration upload hosts); the
//! rewrite table maps those to their correct replacement so the index
//! is always keyed by the canonical form.

use tracing::debug;
use url::Url;

/// Check whether a string is an absolute HTTP(S) URL
pub fn is_http_url(input: &str) -> bool {
    matches!(Url::parse(input), Ok(url) if matches!(url.scheme(), "http" | "https"))
}

/// Canonicalize a remote URL against the known-bad-host table.
///
/// Only absolute HTTP(S) URLs whose host appears in `rewrites` are
/// touched; scheme, path, query and fragment are preserved. Every
/// other input passes through unchanged (already-local paths, asset
/// URIs, plain garbage; the caller decides what to do with those),
/// which also makes the function idempotent.
pub fn normalize_url(input: &str, rewrites: &[(String, String)]) -> String {
    if rewrites.is_empty() {
        return input.to_owned();
    }

    let Ok(mut url) = Url::parse(input) else {
        return input.to_owned();
    };
    if !matches!(url.scheme(), "http" | "https") {
        return input.to_owned();
    }
    let Some(host) = url.host_str() else {
        return input.to_owned();
    };
    let Some((_, replacement)) = rewrites
        .iter()
        .find(|(bad, _)| bad.eq_ignore_ascii_case(host))
    else {
        return input.to_owned();
    };

    match url.set_host(Some(replacement.as_str())) {
        Ok(()) => {
            debug!(from = %input, to = %url, "rewrote known-bad host");
            url.to_string()
        }
        Err(_) => input.to_owned(),
    }
}
