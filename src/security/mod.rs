//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (strip hop-by-hop headers named by Connection)
//!     → Pass to route middlewares
//!
//! Upstream response:
//!     → secure_headers.rs (HSTS, frame options, CSP, ...)
//! ```

pub mod headers;
pub mod secure_headers;

pub use headers::{connection_headers, remove_connection_headers};
pub use secure_headers::SecureHeaders;
