//! Request and body limits.
//!
//! # Responsibilities
//! - Enforce maximum inbound request body size
//! - Collect bounded bodies without losing what was read on overflow
//!
//! # Design Decisions
//! - A declared `content-length` over the limit is rejected before reading
//! - Overflow keeps the chunks already pulled so a caller can still stream
//!   the body through unmodified

use axum::body::Body;
use axum::http::{header, HeaderMap};
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

use crate::error::ProxyError;

/// Outcome of reading a stream up to a byte limit.
#[derive(Debug)]
pub enum Collected {
    /// The stream ended within the limit.
    Complete(Bytes),
    /// The limit was crossed; holds every chunk read so far, in order.
    Overflow(Vec<Bytes>),
}

/// Read `stream` until it ends or more than `limit` bytes were seen.
pub async fn collect_bounded<S, E>(stream: &mut S, limit: usize) -> Result<Collected, E>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    let mut chunks = Vec::new();
    let mut total = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        total = total.saturating_add(chunk.len());
        chunks.push(chunk);
        if total > limit {
            return Ok(Collected::Overflow(chunks));
        }
    }
    Ok(Collected::Complete(join(chunks, total)))
}

fn join(chunks: Vec<Bytes>, total: usize) -> Bytes {
    if chunks.len() == 1 {
        return chunks.into_iter().next().unwrap_or_default();
    }
    let mut buf = BytesMut::with_capacity(total);
    for chunk in chunks {
        buf.extend_from_slice(&chunk);
    }
    buf.freeze()
}

/// Read the inbound request body for forwarding. Empty bodies become `None`.
pub async fn read_request_body(
    body: Body,
    headers: &HeaderMap,
    limit: usize,
) -> Result<Option<Bytes>, ProxyError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(ProxyError::PayloadTooLarge { limit });
    }

    let mut stream = std::pin::pin!(body.into_data_stream());
    match collect_bounded(&mut stream, limit).await {
        Ok(Collected::Complete(bytes)) if bytes.is_empty() => Ok(None),
        Ok(Collected::Complete(bytes)) => Ok(Some(bytes)),
        Ok(Collected::Overflow(_)) => Err(ProxyError::PayloadTooLarge { limit }),
        Err(e) => Err(ProxyError::RequestBody(e.to_string())),
    }
}
