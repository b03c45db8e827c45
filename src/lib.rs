//! Edge router request/response core.

pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod observability;
pub mod resolver;
pub mod routing;
pub mod security;

pub use config::Configuration;
pub use http::{Handler, HttpServer};
pub use lifecycle::Pool;
pub use middleware::{Chain, MiddlewareBuilder};
pub use routing::RouteTable;
