//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Configuration snapshot
//!     → table.rs (build one handler per router)
//!     → ArcSwap publish
//!
//! Incoming request (Host)
//!     → table.rs (exact host, else catch-all)
//!     → route handler
//! ```
//!
//! # Design Decisions
//! - Routes compiled once per snapshot, immutable afterwards
//! - Deterministic: same snapshot always yields the same table

pub mod table;

pub use table::{spawn_reload, RouteTable};
