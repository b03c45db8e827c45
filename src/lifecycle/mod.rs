//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Build route table → Start pooled tasks → Serve
//!
//! Background (pool.rs):
//!     Pool::go(task) → task polls StopSignal → returns
//!
//! Shutdown (shutdown.rs):
//!     SIGTERM/SIGINT → stop accepting → Pool::stop() waits for every task
//! ```
//!
//! # Design Decisions
//! - Background work never runs detached from the pool unless it is
//!   fire-and-forget (`pool::go`)
//! - Panics in background work are contained and logged

pub mod pool;
pub mod shutdown;

pub use pool::{Pool, StopSignal};
pub use shutdown::shutdown_signal;
