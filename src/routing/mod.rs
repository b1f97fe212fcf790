//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path, query)
//!     → router.rs (route lookup: descriptor, status, proxy mode, not found)
//!     → target.rs (decode + validate the target token → ResolvedTarget)
//!
//! Playlist rewriting:
//!     absolute reference URL
//!     → encode.rs (proxy URL under the inbound addressing mode)
//! ```
//!
//! # Design Decisions
//! - Routes compiled per configuration, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - encode.rs and target.rs are inverses of each other

pub mod encode;
pub mod router;
pub mod target;

pub use encode::ProxyUrlEncoder;
pub use router::{ProxyRouter, RouteMatch};
pub use target::{resolve, AddressingMode, ResolvedTarget, TargetRef};
