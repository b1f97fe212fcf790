//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → timeouts.rs (deadline on response headers)
//!     → Playlist buffering: timeouts.rs (same budget for the body read)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries: the proxy forwards arbitrary methods and cannot know
//!   which targets are idempotent

pub mod timeouts;

pub use timeouts::{with_deadline, DeadlineExceeded};
