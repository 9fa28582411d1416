//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Request
//!     → app.rs (HEAD → GET, strict/non-strict path, route match)
//!     → compose.rs (run matched handlers as a next() chain)
//!         handler[0] → next → handler[1] → ... → not-found handler
//!         error at any level → error handler (nearest scope first)
//!     → Context response (or default 404 / 500)
//! ```
//!
//! # Design Decisions
//! - Handlers are trait objects behind `Arc`, so a match result is a cheap
//!   clone out of the immutable route table
//! - Each request owns its dispatch cursor; nothing in the chain is shared
//!   between requests except the handlers themselves
//! - Error and not-found handlers always produce a response; dispatch never
//!   hands an error to the transport

pub mod app;
pub mod compose;

use std::sync::Arc;

use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::error::Error;
use crate::http::Context;

pub use app::{App, AppBuilder, RouteInfo};
pub use compose::{Dispatcher, Next};

/// What a handler hands back: a response, nothing (it only ran `next`),
/// or an error for the error handler.
pub type HandlerResult = Result<Option<Response>, Error>;

/// A route handler or middleware.
pub trait Handler: Send + Sync {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, HandlerResult>;
}

/// Converts an error into the response sent to the client.
pub type ErrorHandler = Arc<dyn for<'a> Fn(Arc<Error>, &'a mut Context) -> BoxFuture<'a, Response> + Send + Sync>;

/// Produces the response for requests no handler answered.
pub type NotFoundHandler = Arc<dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Response> + Send + Sync>;

/// Handler backed by a closure.
pub struct HandlerFn<F>(F);

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
        (self.0)(ctx, next)
    }
}

/// Wrap a closure as a [`Handler`].
///
/// ```ignore
/// let hello = handler_fn(|c, _next| Box::pin(async move { Ok(Some(c.text("hello"))) }));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    HandlerFn(f)
}

/// Wrap a closure as an [`ErrorHandler`].
pub fn error_handler_fn<F>(f: F) -> ErrorHandler
where
    F: for<'a> Fn(Arc<Error>, &'a mut Context) -> BoxFuture<'a, Response> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`NotFoundHandler`].
pub fn not_found_fn<F>(f: F) -> NotFoundHandler
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Response> + Send + Sync + 'static,
{
    Arc::new(f)
}
