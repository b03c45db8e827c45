//! Authentication delegation subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → forward.rs EXTRACT (stage configured headers / query values)
//!     → forward.rs CALL (GET auth address, inbound headers copied)
//!     → 2xx: replay JSON fields onto the request → next handler
//!     → otherwise: auth server response → client
//! ```

pub mod forward;

pub use forward::{forward_auth, ForwardAuth};
