//! Timeout enforcement.
//!
//! # Responsibilities
//! - Put a deadline on every outbound await the proxy makes
//! - Report the elapsed budget so callers can map it to 504
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Dropping the timed-out future cancels the outbound request

use std::future::Future;
use std::time::Duration;

/// The wrapped operation did not finish within its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {0:?} exceeded")]
pub struct DeadlineExceeded(pub Duration);

/// Run `fut` with a deadline of `budget`.
pub async fn with_deadline<F>(budget: Duration, fut: F) -> Result<F::Output, DeadlineExceeded>
where
    F: Future,
{
    tokio::time::timeout(budget, fut)
        .await
        .map_err(|_| DeadlineExceeded(budget))
}
