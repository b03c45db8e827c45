//! Request-side middleware subsystem.
//!
//! # Data Flow
//! ```text
//! Router middleware names
//!     → builder.rs (resolve names against the snapshot)
//!     → chain.rs (ordered constructors)
//!     → Chain::then(terminal) → Handler
//! ```
//!
//! # Design Decisions
//! - `m1, m2, m3` wraps as `m1(m2(m3(terminal)))`
//! - Build failures abort the route; nothing half-wired is returned

pub mod builder;
pub mod chain;
pub mod error;
pub mod headers;

pub use builder::MiddlewareBuilder;
pub use chain::{constructor, Chain, Constructor};
pub use error::BuildError;
