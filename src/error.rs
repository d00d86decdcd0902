//! Request-scoped failures raised by pipeline stages.
//!
//! Every error ends the current request with a status code and a logged
//! warning. Nothing here is retried.

use std::io;

use axum::http::StatusCode;
use thiserror::Error;

use crate::http::writer::ResponseWriter;
use crate::observability::metrics;
use crate::security::auth::AuthError;
use crate::security::decrypt::DecryptError;
use crate::security::subnet::SubnetError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request body read error: {0}")]
    BodyRead(#[source] axum::Error),

    #[error("close compressed body error: {0}")]
    BodyClose(#[source] io::Error),

    #[error("gzip codec error: {0}")]
    Codec(#[source] io::Error),

    #[error("incorrect body digest: {0:?}")]
    IntegrityMismatch(String),

    #[error("decryption error: {0}")]
    Decryption(#[from] DecryptError),

    #[error("authorization error: {0}")]
    Auth(#[from] AuthError),

    #[error("subnet rejection: {0}")]
    SubnetRejection(#[from] SubnetError),
}

impl GatewayError {
    /// Status code the client receives for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BodyRead(_) | Self::IntegrityMismatch(_) | Self::Decryption(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::BodyClose(_) | Self::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::SubnetRejection(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Pipeline stage label used in logs and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::BodyRead(_) => "body",
            Self::BodyClose(_) | Self::Codec(_) => "compression",
            Self::IntegrityMismatch(_) => "integrity",
            Self::Decryption(_) => "decrypt",
            Self::Auth(_) => "auth",
            Self::SubnetRejection(_) => "subnet",
        }
    }

    /// Log the failure and commit its status on the response.
    pub fn respond(&self, path: &str, writer: &mut dyn ResponseWriter) {
        tracing::warn!(path = %path, stage = self.stage(), error = %self, "Request rejected");
        metrics::record_rejection(self.stage());
        writer.write_header(self.status());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::IntegrityMismatch("d1".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::from(DecryptError::LengthMismatch { len: 3, block: 128 }).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Codec(io::ErrorKind::InvalidData.into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::from(AuthError::MissingToken).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::from(SubnetError::Outside(IpAddr::V4(Ipv4Addr::LOCALHOST))).status(),
            StatusCode::FORBIDDEN
        );
    }
}
