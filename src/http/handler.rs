//! Handler contract between the pipeline and the service behind it.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderValue, Request, StatusCode},
};
use serde::Serialize;

use crate::http::writer::ResponseWriter;
use crate::security::auth::SubjectId;

/// A request handler writing its response through a (possibly decorated)
/// writer.
///
/// Every pipeline stage implements this trait and wraps the next one. The
/// terminal handler is invoked at most once per request.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn serve(&self, request: Request<Body>, writer: &mut dyn ResponseWriter);
}

/// Raw peer address attached by the server's connect-info layer.
pub fn peer_addr<B>(request: &Request<B>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

#[derive(Serialize)]
struct EchoBody {
    subject: Option<i64>,
    size: usize,
    body: String,
}

/// Terminal handler answering with the decoded request body.
///
/// Stands in for the ingestion service when the gateway runs standalone.
#[derive(Debug, Clone, Default)]
pub struct EchoHandler {
    body_limit: usize,
}

impl EchoHandler {
    pub fn new(body_limit: usize) -> Self {
        Self { body_limit }
    }
}

#[async_trait]
impl Handler for EchoHandler {
    async fn serve(&self, request: Request<Body>, writer: &mut dyn ResponseWriter) {
        let subject = request.extensions().get::<SubjectId>().map(|id| id.0);
        let bytes = match axum::body::to_bytes(request.into_body(), self.body_limit).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Echo handler failed to read body");
                writer.write_header(StatusCode::BAD_REQUEST);
                return;
            }
        };

        let echo = EchoBody {
            subject,
            size: bytes.len(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        };
        let payload = match serde_json::to_vec(&echo) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Echo handler failed to encode response");
                writer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
                return;
            }
        };

        writer.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        writer.write_header(StatusCode::OK);
        if let Err(e) = writer.write_all(&payload) {
            tracing::warn!(error = %e, "Echo handler write failed");
        }
    }
}
