//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check key material references and network ranges parse
//! - Validate value ranges (levels, limits, header names)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use ipnet::IpNet;
use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("security.trusted_subnet '{0}' is not a CIDR network")]
    Subnet(String),

    #[error("session.redirect_url '{0}' is not a valid URL or absolute path")]
    RedirectUrl(String),

    #[error("session.secret must not be empty")]
    EmptySecret,

    #[error("session.token_ttl_secs must be greater than zero")]
    ZeroTtl,

    #[error("{field} '{value}' is not a valid header name")]
    HeaderName { field: &'static str, value: String },

    #[error("compression.token must not be empty")]
    EmptyCompressionToken,

    #[error("compression.level {0} is out of range 0-9")]
    CompressionLevel(u32),

    #[error("security.max_body_size must be greater than zero")]
    ZeroBodyLimit,

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroTimeout,
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(subnet) = &config.security.trusted_subnet {
        if subnet.parse::<IpNet>().is_err() {
            errors.push(ValidationError::Subnet(subnet.clone()));
        }
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    if matches!(&config.session.secret, Some(secret) if secret.is_empty()) {
        errors.push(ValidationError::EmptySecret);
    }

    if config.session.token_ttl_secs == 0 {
        errors.push(ValidationError::ZeroTtl);
    }

    if !is_redirect_target(&config.session.redirect_url) {
        errors.push(ValidationError::RedirectUrl(config.session.redirect_url.clone()));
    }

    if config.compression.token.trim().is_empty() {
        errors.push(ValidationError::EmptyCompressionToken);
    }

    if config.compression.level > 9 {
        errors.push(ValidationError::CompressionLevel(config.compression.level));
    }

    for (field, value) in [
        ("headers.token", &config.headers.token),
        ("headers.digest", &config.headers.digest),
        ("headers.real_ip", &config.headers.real_ip),
    ] {
        if axum::http::HeaderName::from_bytes(value.as_bytes()).is_err() {
            errors.push(ValidationError::HeaderName {
                field,
                value: value.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Redirects may point at an absolute URL or a path on this host.
fn is_redirect_target(target: &str) -> bool {
    if target.starts_with('/') {
        return url::Url::parse("http://localhost")
            .and_then(|base| base.join(target))
            .is_ok();
    }
    url::Url::parse(target).is_ok()
}
