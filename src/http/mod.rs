//! HTTP handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, dispatch by Host)
//!     → route handler (sanitizer → middlewares → forwarder)
//!     → proxy.rs (URI rewrite, CNAME flattening, upstream call)
//!     → response.rs (response modifiers, reverse order)
//!     → Send to client
//! ```

pub mod handler;
pub mod proxy;
pub mod response;
pub mod server;

pub use handler::Handler;
pub use proxy::{http_client, Forwarder, HttpClient};
pub use response::{compose, ModifierError, ResponseModifier, ResponseModifierBuilder};
pub use server::HttpServer;
