//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware stack, dispatch)
//!     → request.rs (request ID, per-request span)
//!     → routing → upstream → playlist
//!     → response.rs (status, relaxed headers, streamed or buffered body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer, ServerError};
