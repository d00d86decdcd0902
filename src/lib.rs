//! Ingest gateway library.
//!
//! An HTTP middleware pipeline guarding a metrics-ingestion service:
//! subnet filtering, RSA payload decryption, gzip content coding, HMAC body
//! integrity and fingerprint-bound session tokens, around any [`Handler`].

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use http::{Handler, HttpServer, ResponseWriter};
pub use lifecycle::Shutdown;
