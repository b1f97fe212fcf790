//! Response emission.
//!
//! # Responsibilities
//! - Propagate the upstream status verbatim (3xx/4xx included)
//! - Relax upstream headers before the CORS layer adds its own
//! - Stream passthrough bodies, send buffered playlist bodies in one piece
//!
//! # Design Decisions
//! - A rewritten body never carries the upstream `content-length`; hyper
//!   recomputes it from the buffered body
//! - Only text payloads are compressed; media and ranged responses are not

use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use bytes::Bytes;

use crate::playlist::classify::{is_playlist_type, mime_essence};
use crate::security::headers::relax_response_headers;
use crate::upstream::BodyStream;

/// Body handed to [`emit`].
pub enum Payload {
    /// Upstream bytes, pulled as the caller reads.
    Stream(BodyStream),
    /// Fully read (and possibly rewritten) body.
    Buffered(Bytes),
}

/// Build the caller-facing response for an upstream reply.
pub fn emit(
    status: StatusCode,
    upstream_headers: &HeaderMap,
    payload: Payload,
    rewritten: bool,
) -> Response {
    let body = match payload {
        Payload::Stream(stream) => Body::from_stream(stream),
        Payload::Buffered(bytes) => Body::from(bytes),
    };
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = relax_response_headers(upstream_headers, rewritten);
    response
}

/// Compression predicate for outgoing responses.
pub fn compressible(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::PARTIAL_CONTENT || headers.contains_key(header::CONTENT_RANGE) {
        return false;
    }
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let essence = mime_essence(content_type);
    essence.starts_with("text/")
        || essence == "application/json"
        || is_playlist_type(&essence)
}
