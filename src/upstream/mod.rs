//! Outbound fetch subsystem.
//!
//! # Data Flow
//! ```text
//! ResolvedTarget + forwarded headers + optional body
//!     → client.rs (reqwest, redirect + DNS policy, header deadline)
//!     → UpstreamResponse (status, headers, final URL, body stream)
//! ```

pub mod client;

use axum::http::{header, HeaderMap, Method, StatusCode};
use bytes::Bytes;
use futures_util::stream::BoxStream;
use url::Url;

pub use client::UpstreamClient;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Upstream body, pulled lazily by whoever serves the response.
pub type BodyStream = BoxStream<'static, Result<Bytes, BoxError>>;

/// One request to send upstream.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub target: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Upstream response with headers received and the body not yet read.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// URL the response actually came from, after redirects.
    pub final_url: Url,
    pub body: BodyStream,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("final_url", &self.final_url.as_str())
            .finish_non_exhaustive()
    }
}
