//! Security response headers.
//!
//! Each header is toggled independently by its own option in
//! [`HeadersConfig`]. Values are validated once when the route is built, so
//! applying them to a response cannot fail.

use axum::http::header::{
    CONTENT_SECURITY_POLICY, REFERRER_POLICY, STRICT_TRANSPORT_SECURITY,
    X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::HeadersConfig;
use crate::middleware::BuildError;

const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

/// Precomputed security headers for one `headers` middleware.
#[derive(Debug, Clone, Default)]
pub struct SecureHeaders {
    values: Vec<(HeaderName, HeaderValue)>,
}

impl SecureHeaders {
    pub fn from_config(config: &HeadersConfig) -> Result<Self, BuildError> {
        let mut values = Vec::new();

        if config.sts_seconds > 0 || config.force_sts_header {
            let mut sts = format!("max-age={}", config.sts_seconds);
            if config.sts_include_subdomains {
                sts.push_str("; includeSubDomains");
            }
            if config.sts_preload {
                sts.push_str("; preload");
            }
            values.push((STRICT_TRANSPORT_SECURITY, value(&STRICT_TRANSPORT_SECURITY, &sts)?));
        }

        if !config.custom_frame_options_value.is_empty() {
            values.push((
                X_FRAME_OPTIONS,
                value(&X_FRAME_OPTIONS, &config.custom_frame_options_value)?,
            ));
        } else if config.frame_deny {
            values.push((X_FRAME_OPTIONS, HeaderValue::from_static("DENY")));
        }

        if config.content_type_nosniff {
            values.push((X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")));
        }

        if !config.custom_browser_xss_value.is_empty() {
            values.push((
                X_XSS_PROTECTION,
                value(&X_XSS_PROTECTION, &config.custom_browser_xss_value)?,
            ));
        } else if config.browser_xss_filter {
            values.push((X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")));
        }

        for (name, raw) in [
            (CONTENT_SECURITY_POLICY, &config.content_security_policy),
            (REFERRER_POLICY, &config.referrer_policy),
            (PERMISSIONS_POLICY, &config.permissions_policy),
        ] {
            if !raw.is_empty() {
                let v = value(&name, raw)?;
                values.push((name, v));
            }
        }

        Ok(Self { values })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Set every configured security header, replacing existing values.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, v) in &self.values {
            headers.insert(name.clone(), v.clone());
        }
    }
}

fn value(name: &HeaderName, raw: &str) -> Result<HeaderValue, BuildError> {
    HeaderValue::from_str(raw).map_err(|e| BuildError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_configured() {
        let secure = SecureHeaders::from_config(&HeadersConfig::default()).unwrap();
        assert!(secure.is_empty());
    }

    #[test]
    fn test_each_option_independent() {
        let config = HeadersConfig {
            sts_seconds: 31536000,
            sts_include_subdomains: true,
            sts_preload: true,
            frame_deny: true,
            content_type_nosniff: true,
            referrer_policy: "no-referrer".into(),
            ..Default::default()
        };
        let secure = SecureHeaders::from_config(&config).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("ALLOWALL"));
        secure.apply(&mut headers);

        assert_eq!(
            headers[STRICT_TRANSPORT_SECURITY],
            "max-age=31536000; includeSubDomains; preload"
        );
        assert_eq!(headers[X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers[X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[REFERRER_POLICY], "no-referrer");
        assert!(headers.get(X_XSS_PROTECTION).is_none());
        assert!(headers.get(CONTENT_SECURITY_POLICY).is_none());
    }

    #[test]
    fn test_custom_values_override_flags() {
        let config = HeadersConfig {
            frame_deny: true,
            custom_frame_options_value: "SAMEORIGIN".into(),
            browser_xss_filter: true,
            custom_browser_xss_value: "0".into(),
            force_sts_header: true,
            ..Default::default()
        };
        let mut headers = HeaderMap::new();
        SecureHeaders::from_config(&config).unwrap().apply(&mut headers);

        assert_eq!(headers[X_FRAME_OPTIONS], "SAMEORIGIN");
        assert_eq!(headers[X_XSS_PROTECTION], "0");
        assert_eq!(headers[STRICT_TRANSPORT_SECURITY], "max-age=0");
    }

    #[test]
    fn test_invalid_value_rejected() {
        let config = HeadersConfig {
            content_security_policy: "default-src\n'self'".into(),
            ..Default::default()
        };
        let err = SecureHeaders::from_config(&config).unwrap_err();
        assert!(matches!(err, BuildError::InvalidHeader { ref name, .. } if name == "content-security-policy"));
    }
}
