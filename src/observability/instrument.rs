//! Response instrumentation: the outermost pipeline stage.
//!
//! Wraps the transport writer to record the committed status and the number
//! of body bytes, then emits a begin and an end event per request.

use std::io;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
};

use crate::http::handler::Handler;
use crate::http::writer::ResponseWriter;
use crate::observability::metrics;

/// Passthrough writer that counts what reaches the transport.
#[derive(Debug)]
pub struct InstrumentedWriter<W> {
    inner: W,
    status: Option<StatusCode>,
    bytes_written: usize,
}

impl<W: ResponseWriter> InstrumentedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            status: None,
            bytes_written: 0,
        }
    }

    /// First status committed through this writer.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Running total of body bytes accepted by the inner writer.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }
}

impl<W: ResponseWriter> ResponseWriter for InstrumentedWriter<W> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        let size = self.inner.write(buf)?;
        self.bytes_written += size;
        Ok(size)
    }
}

/// Logs every request around the rest of the pipeline.
pub struct ResponseInstrumentor<H> {
    inner: H,
}

impl<H: Handler> ResponseInstrumentor<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<H: Handler> Handler for ResponseInstrumentor<H> {
    async fn serve(&self, request: Request<Body>, writer: &mut dyn ResponseWriter) {
        let method = request.method().to_string();
        let path = request.uri().path().to_string();
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let started_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let start = Instant::now();

        tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            started_ms,
            "Request started"
        );

        let mut instrumented = InstrumentedWriter::new(writer);
        self.inner.serve(request, &mut instrumented).await;

        // The transport commits 200 when nothing was written.
        let status = instrumented.status().unwrap_or(StatusCode::OK);
        let size = instrumented.bytes_written();

        tracing::info!(
            request_id = %request_id,
            path = %path,
            status = status.as_u16(),
            size,
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        metrics::record_request(&method, status.as_u16(), size, start);
    }
}
