//! Edge router library: route matching, handler dispatch and the HTTP
//! serving surface around them.

pub mod admin;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod mock;
pub mod observability;
pub mod routing;

pub use config::schema::ServerConfig;
pub use dispatch::{handler_fn, App, AppBuilder, Handler, Next};
pub use error::{Error, Result};
pub use http::{Context, HttpServer};
pub use lifecycle::Shutdown;
pub use routing::{SmartRouter, Strategy};
