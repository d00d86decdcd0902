//! Security stages of the pipeline.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → subnet.rs (origin must lie in the trusted network)
//!     → decrypt.rs (RSA-OAEP body blocks → plaintext)
//!     → [gzip decoding, http::compression]
//!     → integrity.rs (HMAC-SHA256 body digest)
//!     → auth.rs (fingerprint-bound session token)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: a failed check ends the request with its status
//! - An unconfigured key disables its stage
//! - Key material is loaded once and never mutated

pub mod auth;
pub mod decrypt;
pub mod integrity;
pub mod subnet;

pub use auth::{SessionAuthenticator, SubjectId};
pub use decrypt::PayloadDecryptor;
pub use integrity::IntegrityCodec;
pub use subnet::SubnetFilter;
