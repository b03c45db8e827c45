//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that routers reference existing services
//! - Validate URLs and value ranges (upstreams are plain HTTP, auth servers
//!   may use HTTPS)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Middleware references are NOT checked here: an unknown middleware fails
//!   only the routes using it, at route build time
//! - Validation is pure function: Configuration → Result<(), Vec<ValidationError>>

use thiserror::Error;
use url::Url;

use crate::config::schema::{Configuration, MiddlewareSpec};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("router '{router}' references unknown service '{service}'")]
    UnknownService { router: String, service: String },
    #[error("service '{service}' has invalid url '{url}'")]
    InvalidServiceUrl { service: String, url: String },
    #[error("middleware '{middleware}' has invalid auth address '{address}'")]
    InvalidAuthAddress { middleware: String, address: String },
    #[error("resolver {field} must be greater than zero")]
    ZeroResolverSetting { field: &'static str },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &Configuration) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, router) in &config.routers {
        if !config.services.contains_key(&router.service) {
            errors.push(ValidationError::UnknownService {
                router: name.clone(),
                service: router.service.clone(),
            });
        }
    }

    for (name, service) in &config.services {
        if !is_url_with_scheme(&service.url, &["http"]) {
            errors.push(ValidationError::InvalidServiceUrl {
                service: name.clone(),
                url: service.url.clone(),
            });
        }
    }

    for (name, spec) in &config.middlewares {
        if let MiddlewareSpec::ForwardAuth(fa) = spec {
            if !is_url_with_scheme(&fa.address, &["http", "https"]) {
                errors.push(ValidationError::InvalidAuthAddress {
                    middleware: name.clone(),
                    address: fa.address.clone(),
                });
            }
        }
    }

    if config.resolver.enabled {
        if config.resolver.max_depth == 0 {
            errors.push(ValidationError::ZeroResolverSetting { field: "max_depth" });
        }
        if config.resolver.cache_ttl_secs == 0 {
            errors.push(ValidationError::ZeroResolverSetting { field: "cache_ttl_secs" });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_url_with_scheme(raw: &str, schemes: &[&str]) -> bool {
    match Url::parse(raw) {
        Ok(url) => schemes.contains(&url.scheme()) && url.host_str().is_some(),
        Err(_) => false,
    }
}
