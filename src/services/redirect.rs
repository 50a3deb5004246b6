//! Open-redirect protection for the post-login redirect
//!
//! A target is resolved against this application's own origin (so relative
//! paths work) and accepted only if the result is http(s) and lands on the
//! same host and port, with no credentials embedded in the authority.

use url::Url;

/// Resolve `target` against `http://{host}/` and check it stays on `host`.
///
/// `host` is the request's `Host` value (`name` or `name:port`).
pub fn is_safe_url(host: &str, target: &str) -> bool {
    let Ok(base) = Url::parse(&format!("http://{}/", host)) else {
        return false;
    };
    let Ok(resolved) = base.join(target) else {
        return false;
    };

    matches!(resolved.scheme(), "http" | "https")
        && resolved.username().is_empty()
        && resolved.password().is_none()
        && resolved.host_str() == base.host_str()
        && resolved.port() == base.port()
}
