//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (request body size)
//!     → headers.rs (allow-list inbound headers for forwarding)
//!
//! Resolved target / redirect hop / DNS answer:
//!     → target_policy.rs (scheme + public host checks)
//!
//! Upstream response:
//!     → headers.rs (strip hop-by-hop and origin-bound headers,
//!       add hardening headers)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a target that cannot be shown to be public is refused
//! - No trust in client input

pub mod headers;
pub mod limits;
pub mod target_policy;

pub use target_policy::{PolicyViolation, TargetPolicy};
