//! Header filtering in both directions plus hardening headers.
//!
//! # Responsibilities
//! - Build the outbound header set from an allow-list of inbound headers
//! - Strip hop-by-hop headers and origin-bound policy headers from upstream
//!   responses
//! - Add hardening response headers (helmet defaults without CSP)
//!
//! # Design Decisions
//! - Inbound headers are never forwarded wholesale: cookies, authorization
//!   and host identity stay on this side
//! - Filtering returns a new map; the source map is left untouched

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Inbound headers forwarded to the target.
const FORWARDED_REQUEST_HEADERS: [HeaderName; 12] = [
    header::ACCEPT,
    header::ACCEPT_LANGUAGE,
    header::RANGE,
    header::IF_RANGE,
    header::IF_MATCH,
    header::IF_NONE_MATCH,
    header::IF_MODIFIED_SINCE,
    header::IF_UNMODIFIED_SINCE,
    header::USER_AGENT,
    header::CONTENT_TYPE,
    header::CACHE_CONTROL,
    header::PRAGMA,
];

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const DESCRIBES_ORIGINAL_BYTES: [HeaderName; 3] = [
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
];

/// Headers the browser would apply against the proxy's origin rather than
/// the target's, or that CORS middleware re-issues.
fn is_origin_bound(name: &str) -> bool {
    name.starts_with("access-control-")
        || name.starts_with("cross-origin-")
        || name.starts_with("content-security-policy")
        || matches!(
            name,
            "set-cookie" | "x-frame-options" | "strict-transport-security"
        )
}

/// Outbound header set for a forwarded request.
pub fn forward_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut outbound = HeaderMap::new();
    for name in FORWARDED_REQUEST_HEADERS.iter() {
        for value in inbound.get_all(name) {
            outbound.append(name.clone(), value.clone());
        }
    }
    outbound
}

/// Response headers safe to hand to the caller.
///
/// `body_rewritten` drops the upstream length and range headers, which no
/// longer describe the body.
pub fn relax_response_headers(upstream: &HeaderMap, body_rewritten: bool) -> HeaderMap {
    // Names listed in `Connection` are hop-by-hop as well.
    let connection_listed: Vec<String> = upstream
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut relaxed = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream.iter() {
        let lower = name.as_str();
        if HOP_BY_HOP.contains(&lower)
            || is_origin_bound(lower)
            || connection_listed.iter().any(|listed| listed == lower)
            || (body_rewritten && DESCRIBES_ORIGINAL_BYTES.contains(name))
        {
            continue;
        }
        relaxed.append(name.clone(), value.clone());
    }
    relaxed
}

/// Hardening headers added to every response that does not carry them.
pub fn security_headers() -> [(HeaderName, HeaderValue); 7] {
    [
        (
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ),
        (
            header::X_DNS_PREFETCH_CONTROL,
            HeaderValue::from_static("off"),
        ),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN")),
        (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
        (
            HeaderName::from_static("x-permitted-cross-domain-policies"),
            HeaderValue::from_static("none"),
        ),
        (
            HeaderName::from_static("cross-origin-resource-policy"),
            HeaderValue::from_static("cross-origin"),
        ),
        (
            HeaderName::from_static("origin-agent-cluster"),
            HeaderValue::from_static("?1"),
        ),
    ]
}

/// Insert [`security_headers`] that are not already present.
pub fn apply_security_headers(headers: &mut HeaderMap) {
    for (name, value) in security_headers() {
        if !headers.contains_key(&name) {
            headers.insert(name, value);
        }
    }
}
