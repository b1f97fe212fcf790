//! Service health reporting.
//!
//! # Data Flow
//! ```text
//! GET /               → status.rs (ServiceDescriptor from live config)
//! GET {base}/status   → status.rs (StatusReport: uptime, environment, memory)
//! ```
//!
//! # Design Decisions
//! - Reports describe this process only; upstream targets are never probed
//! - Memory is read per request, no background sampling

pub mod status;

pub use status::{ServiceDescriptor, StatusReport};
