//! Immutable settings shared by every pipeline stage.

use axum::http::HeaderName;

use crate::config::{CompressionConfig, GatewayConfig, HeaderConfig};
use crate::config::validation::ValidationError;

/// Header names the pipeline reads and writes.
#[derive(Debug, Clone)]
pub struct HeaderNames {
    /// Session token header (request and echoed response).
    pub token: HeaderName,
    /// Integrity digest header (request and response).
    pub digest: HeaderName,
    /// Trusted origin override header.
    pub real_ip: HeaderName,
}

impl HeaderNames {
    pub fn from_config(config: &HeaderConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            token: parse_header("headers.token", &config.token)?,
            digest: parse_header("headers.digest", &config.digest)?,
            real_ip: parse_header("headers.real_ip", &config.real_ip)?,
        })
    }
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            token: HeaderName::from_static("authorization"),
            digest: HeaderName::from_static("hashsha256"),
            real_ip: HeaderName::from_static("x-real-ip"),
        }
    }
}

fn parse_header(field: &'static str, value: &str) -> Result<HeaderName, ValidationError> {
    HeaderName::from_bytes(value.as_bytes()).map_err(|_| ValidationError::HeaderName {
        field,
        value: value.to_string(),
    })
}

/// Outbound compression negotiation settings.
#[derive(Debug, Clone)]
pub struct CompressionSettings {
    /// Encoding token, e.g. `gzip`.
    pub token: String,
    /// Lowercased base content types eligible for compression.
    pub content_types: Vec<String>,
    /// Gzip level (0-9).
    pub level: u32,
}

impl From<&CompressionConfig> for CompressionSettings {
    fn from(config: &CompressionConfig) -> Self {
        Self {
            token: config.token.to_ascii_lowercase(),
            content_types: config
                .content_types
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .collect(),
            level: config.level,
        }
    }
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self::from(&CompressionConfig::default())
    }
}

/// Settings fixed at pipeline construction.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub headers: HeaderNames,
    pub compression: CompressionSettings,
    /// Upper bound for buffered and decoded request bodies.
    pub body_limit: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            headers: HeaderNames::from_config(&config.headers)?,
            compression: CompressionSettings::from(&config.compression),
            body_limit: config.security.max_body_size,
        })
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            headers: HeaderNames::default(),
            compression: CompressionSettings::default(),
            body_limit: 2 * 1024 * 1024,
        }
    }
}
