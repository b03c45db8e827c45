//! Configuration schema definitions.
//!
//! This module defines one configuration snapshot: routers, the services they
//! forward to, and the named middlewares they reference. All types derive Serde
//! traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration snapshot.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct Configuration {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Routers keyed by name.
    pub routers: BTreeMap<String, RouterConfig>,

    /// Upstream services keyed by name.
    pub services: BTreeMap<String, ServiceConfig>,

    /// Middlewares keyed by name.
    pub middlewares: BTreeMap<String, MiddlewareSpec>,

    /// CNAME flattening settings.
    pub resolver: ResolverConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// A router: which requests it takes, which middlewares they cross, where they go.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RouterConfig {
    /// Host header to match (exact, case-insensitive). `None` matches any host.
    #[serde(default)]
    pub host: Option<String>,

    /// Service name to forward to.
    pub service: String,

    /// Middleware names, outermost first.
    #[serde(default)]
    pub middlewares: Vec<String>,
}

/// An upstream service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServiceConfig {
    /// Base URL (e.g., "http://127.0.0.1:3000").
    pub url: String,
}

/// A named, typed middleware configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MiddlewareSpec {
    Headers(HeadersConfig),
    Chain(ChainConfig),
    ForwardAuth(ForwardAuthConfig),
}

impl MiddlewareSpec {
    /// Short kind name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            MiddlewareSpec::Headers(_) => "headers",
            MiddlewareSpec::Chain(_) => "chain",
            MiddlewareSpec::ForwardAuth(_) => "forward_auth",
        }
    }
}

/// Ordered list of other middleware names.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct ChainConfig {
    pub middlewares: Vec<String>,
}

/// Custom headers and security headers.
///
/// An empty custom header value removes the header.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct HeadersConfig {
    /// Headers set on (or removed from) the request before it is forwarded.
    pub custom_request_headers: BTreeMap<String, String>,

    /// Headers set on (or removed from) the upstream response.
    pub custom_response_headers: BTreeMap<String, String>,

    /// `Strict-Transport-Security` max-age. Zero disables the header.
    pub sts_seconds: u64,
    pub sts_include_subdomains: bool,
    pub sts_preload: bool,
    /// Always emit `max-age=0` when `sts_seconds` is zero.
    pub force_sts_header: bool,

    /// `X-Frame-Options: DENY`.
    pub frame_deny: bool,
    /// Overrides the `X-Frame-Options` value (e.g. `SAMEORIGIN`).
    pub custom_frame_options_value: String,

    /// `X-Content-Type-Options: nosniff`.
    pub content_type_nosniff: bool,

    /// `X-XSS-Protection: 1; mode=block`.
    pub browser_xss_filter: bool,
    /// Overrides the `X-XSS-Protection` value.
    pub custom_browser_xss_value: String,

    pub content_security_policy: String,
    pub referrer_policy: String,
    pub permissions_policy: String,
}

impl HeadersConfig {
    /// Whether any security header option is set.
    pub fn has_security_headers_defined(&self) -> bool {
        self.sts_seconds != 0
            || self.force_sts_header
            || self.frame_deny
            || !self.custom_frame_options_value.is_empty()
            || self.content_type_nosniff
            || self.browser_xss_filter
            || !self.custom_browser_xss_value.is_empty()
            || !self.content_security_policy.is_empty()
            || !self.referrer_policy.is_empty()
            || !self.permissions_policy.is_empty()
    }
}

/// Where a forward auth parameter is read from or written to.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParamLocation {
    #[default]
    Header,
    Query,
}

/// Value copied from the inbound request into the auth call.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RequestParameter {
    /// Where the value is read on the inbound request.
    #[serde(default)]
    pub from: ParamLocation,
    /// Header or query parameter name to read.
    pub name: String,
    /// Name used on the auth call. Defaults to `name`.
    #[serde(default)]
    pub to: Option<String>,
    /// Where the value is placed on the auth call.
    #[serde(default)]
    pub to_location: ParamLocation,
}

impl RequestParameter {
    pub fn destination(&self) -> &str {
        self.to.as_deref().unwrap_or(&self.name)
    }
}

/// Value taken from the auth server's JSON body and added to the forwarded request.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ReplayField {
    /// Dotted JSON path (e.g. `user.id`).
    pub path: String,
    /// Header or query parameter name on the forwarded request.
    pub to: String,
    #[serde(default)]
    pub location: ParamLocation,
}

/// TLS settings for the forward auth client.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ClientTlsConfig {
    /// PEM bundle of extra trusted roots.
    pub ca: Option<String>,
    /// PEM client certificate (requires `key`).
    pub cert: Option<String>,
    /// PEM client private key.
    pub key: Option<String>,
    pub insecure_skip_verify: bool,
}

/// Forward authentication middleware settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ForwardAuthConfig {
    /// Auth server URL, queried with `GET`.
    pub address: String,

    #[serde(default)]
    pub tls: Option<ClientTlsConfig>,

    /// Keep inbound `X-Forwarded-*` headers instead of overwriting them.
    #[serde(default)]
    pub trust_forward_header: bool,

    /// Auth response headers copied onto the forwarded request on success.
    #[serde(default)]
    pub auth_response_headers: Vec<String>,

    /// Inbound values sent to the auth server, keyed by source name.
    #[serde(default)]
    pub request_parameters: BTreeMap<String, RequestParameter>,

    /// JSON values replayed onto the forwarded request, keyed by source name.
    #[serde(default)]
    pub response_replay: BTreeMap<String, ReplayField>,

    /// Total timeout for the auth call.
    #[serde(default = "default_auth_timeout")]
    pub timeout_secs: u64,
}

fn default_auth_timeout() -> u64 {
    30
}

/// CNAME flattening configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    pub enabled: bool,

    /// Cache lifetime of a resolved chain.
    pub cache_ttl_secs: u64,

    /// Resolver configuration file listing nameservers.
    pub resolv_conf: String,

    /// Maximum chain length, also the budget for failed queries.
    pub max_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cache_ttl_secs: 30,
            resolv_conf: "/etc/resolv.conf".to_string(),
            max_depth: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
