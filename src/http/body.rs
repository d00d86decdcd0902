//! Request body buffering for stages that must see the whole payload.

use axum::body::{Body, Bytes};

use crate::error::GatewayError;

/// Read the full body, failing once `limit` bytes are exceeded.
pub async fn read_body(body: Body, limit: usize) -> Result<Bytes, GatewayError> {
    axum::body::to_bytes(body, limit)
        .await
        .map_err(GatewayError::BodyRead)
}
