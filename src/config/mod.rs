//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Configuration (validated, immutable snapshot)
//!
//! On change:
//!     watcher.rs detects change
//!     → loader.rs loads new snapshot
//!     → mpsc channel → reload task → RouteTable::apply
//! ```
//!
//! # Design Decisions
//! - A snapshot is immutable once loaded; changes replace it wholesale
//! - All optional fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ChainConfig, ClientTlsConfig, Configuration, ForwardAuthConfig, HeadersConfig, ListenerConfig,
    MiddlewareSpec, ObservabilityConfig, ParamLocation, ReplayField, RequestParameter,
    ResolverConfig, RouterConfig, ServiceConfig,
};
pub use watcher::ConfigWatcher;
