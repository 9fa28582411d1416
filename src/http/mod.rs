//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tower layers: request ID, trace, timeout, limits)
//!     → request.rs (request ID generation and lookup)
//!     → App::dispatch (route match, handler chain over a Context)
//!     → context.rs (request accessors, response builders, merged headers)
//!     → Send to client
//! ```

pub mod context;
pub mod request;
pub mod server;

pub use context::Context;
pub use request::{RequestIdExt, UuidRequestId, X_REQUEST_ID};
pub use server::HttpServer;
