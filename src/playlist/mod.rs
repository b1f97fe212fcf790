//! HLS playlist handling.
//!
//! # Data Flow
//! ```text
//! Upstream response (content type, final URL)
//!     → classify.rs (playlist or passthrough, decided once)
//!     → rewriter.rs (buffered body → rewritten text, or RewriteError)
//! ```
//!
//! A failed rewrite never produces a partial document: the caller falls back
//! to the original bytes.

pub mod classify;
pub mod rewriter;

pub use classify::{charset, classify, ContentClass};
pub use rewriter::{PlaylistDocument, PlaylistRewriter, RewriteError};
