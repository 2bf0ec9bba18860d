//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0)
//! - Check that configured URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Per-appservice identity checks live in the registry build, which is the
//!   only place that sees every token at once

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listen address not configured")]
    MissingListenAddress,

    #[error("no appservices configured")]
    NoAppServices,

    #[error("invalid {field} URL '{value}': {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listen_address.trim().is_empty() {
        errors.push(ValidationError::MissingListenAddress);
    }
    if config.appservices.is_empty() {
        errors.push(ValidationError::NoAppServices);
    }

    check_url(&mut errors, "sync_proxy.url", &config.sync_proxy.url);
    check_url(&mut errors, "sync_proxy.wsproxy_url", &config.sync_proxy.wsproxy_url);

    let http = &config.http;
    if http.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue("http.request_timeout_secs"));
    }
    if http.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroValue("http.max_body_bytes"));
    }
    if http.close_timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue("http.close_timeout_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// Empty URLs are allowed: delegation then fails per call as misconfigured.
fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.is_empty() {
        return;
    }
    if let Err(e) = Url::parse(value) {
        errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: e.to_string(),
        });
    }
}
