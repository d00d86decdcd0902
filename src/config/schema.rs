//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the ingest gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Key material and origin filtering.
    pub security: SecurityConfig,

    /// Session token settings.
    pub session: SessionConfig,

    /// Response compression settings.
    pub compression: CompressionConfig,

    /// Header names used by the pipeline.
    pub headers: HeaderConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
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

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Allowed client network in CIDR notation. `None` admits everyone.
    pub trusted_subnet: Option<String>,

    /// PEM-encoded RSA private key used to decrypt request bodies.
    pub private_key_path: Option<PathBuf>,

    /// Shared HMAC key for body digests.
    pub hash_key: Option<String>,

    /// Maximum body size in bytes (raw and decoded).
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            trusted_subnet: None,
            private_key_path: None,
            hash_key: None,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Session token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Signing secret. Authentication is disabled when absent.
    pub secret: Option<String>,

    /// Where rejected clients are sent to re-authenticate.
    pub redirect_url: String,

    /// Lifetime of issued tokens in seconds.
    pub token_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            redirect_url: "/login".to_string(),
            token_ttl_secs: 3600,
        }
    }
}

/// Response compression configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Content-coding token negotiated with clients.
    pub token: String,

    /// Content types eligible for compression.
    pub content_types: Vec<String>,

    /// Gzip level, 0 (store) to 9 (best).
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            token: "gzip".to_string(),
            content_types: vec!["application/json".to_string(), "text/html".to_string()],
            level: 6,
        }
    }
}

/// Header names read and written by the pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderConfig {
    pub token: String,
    pub digest: String,
    pub real_ip: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            token: "Authorization".to_string(),
            digest: "HashSHA256".to_string(),
            real_ip: "X-Real-IP".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
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
