//! Build-time errors for chains, middlewares and response modifiers.

use thiserror::Error;

/// Why a route's handler (or one of its parts) could not be built.
///
/// Build errors fail the affected route only; a half-built handler is never
/// returned.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("middleware '{name}' does not exist")]
    UnknownMiddleware { name: String },

    #[error("recursion detected in middleware chain: {path}")]
    Recursion { path: String },

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid address '{address}'")]
    InvalidAddress { address: String },

    #[error("service '{service}' does not exist")]
    UnknownService { service: String },

    #[error("failed to read TLS file '{path}': {source}")]
    TlsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("middleware '{name}': {source}")]
    Middleware {
        name: String,
        #[source]
        source: Box<BuildError>,
    },
}

impl BuildError {
    /// Attribute this error to a middleware, unless it already is.
    pub fn in_middleware(self, name: &str) -> Self {
        match self {
            err @ (BuildError::Middleware { .. }
            | BuildError::UnknownMiddleware { .. }
            | BuildError::Recursion { .. }) => err,
            err => BuildError::Middleware {
                name: name.to_string(),
                source: Box::new(err),
            },
        }
    }
}
