//! Error taxonomy and the JSON error envelope.
//!
//! Resolver and fetch failures are typed as [`ProxyError`]. The handler
//! attaches the request path with [`ProxyError::at`] and the resulting
//! [`ErrorEnvelope`] renders as
//! `{ "error": { "code", "message", "path" }, "success": false, "timestamp" }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Everything that can replace a proxied body with an error envelope.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("Could not read request body: {0}")]
    RequestBody(String),
    #[error("Upstream did not respond within {0:?}")]
    UpstreamTimeout(std::time::Duration),
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),
    #[error("Upstream protocol error: {0}")]
    UpstreamProtocolError(String),
    #[error("Not Found")]
    NotFound,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidTarget(_) | ProxyError::RequestBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamUnreachable(_) | ProxyError::UpstreamProtocolError(_) => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::NotFound => StatusCode::NOT_FOUND,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::InvalidTarget(_) => "invalid_target",
            ProxyError::PayloadTooLarge { .. } => "payload_too_large",
            ProxyError::RequestBody(_) => "request_body",
            ProxyError::UpstreamTimeout(_) => "upstream_timeout",
            ProxyError::UpstreamUnreachable(_) => "upstream_unreachable",
            ProxyError::UpstreamProtocolError(_) => "upstream_protocol_error",
            ProxyError::NotFound => "not_found",
            ProxyError::Internal(_) => "internal",
        }
    }

    /// Bind the error to the request path it answers.
    pub fn at(self, path: impl Into<String>) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self,
            path: path.into(),
        }
    }
}

/// A [`ProxyError`] ready to be written to the caller.
#[derive(Debug)]
pub struct ErrorEnvelope {
    pub error: ProxyError,
    pub path: String,
}

#[derive(Serialize)]
struct EnvelopeBody<'a> {
    error: ErrorDetail<'a>,
    success: bool,
    timestamp: String,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: u16,
    message: String,
    path: &'a str,
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        let status = self.error.status();
        let body = EnvelopeBody {
            error: ErrorDetail {
                code: status.as_u16(),
                message: self.error.to_string(),
                path: &self.path,
            },
            success: false,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        (status, Json(body)).into_response()
    }
}
