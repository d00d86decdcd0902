//! Gzip content coding for request and response bodies.
//!
//! ## Inbound
//!
//! Bodies whose `Content-Encoding` lists the negotiated token are decoded
//! before later stages run. A malformed stream fails the request with 500.
//!
//! ## Outbound
//!
//! When the client's `Accept-Encoding` lists the token, the response writer
//! is wrapped in a [`GzipWriter`]. Compression is decided once, when the
//! status is committed:
//!
//! - status must be `200 OK`
//! - the content type must be in the configured allow-list
//! - the handler must not have set its own `Content-Encoding`
//!
//! Each write is compressed and flushed as one complete gzip member.

use std::io::{self, Read, Write};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::GatewayError;
use crate::http::body::read_body;
use crate::http::handler::Handler;
use crate::http::settings::CompressionSettings;
use crate::http::writer::ResponseWriter;

/// Whether a comma-separated coding list names `token`. Parameters such as
/// `;q=0.5` are ignored.
pub fn lists_token(value: &str, token: &str) -> bool {
    value.split(',').any(|part| {
        part.split(';')
            .next()
            .map(|coding| coding.trim().eq_ignore_ascii_case(token))
            .unwrap_or(false)
    })
}

fn header_lists_token(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| lists_token(v, token))
}

/// Decode a complete gzip body, bounded by `limit` decoded bytes.
pub fn gzip_decode(data: &[u8], limit: usize) -> Result<Vec<u8>, GatewayError> {
    let mut decoder = MultiGzDecoder::new(data).take(limit as u64 + 1);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(GatewayError::Codec)?;
    if decoded.len() > limit {
        return Err(GatewayError::Codec(io::Error::new(
            io::ErrorKind::InvalidData,
            "decoded body exceeds limit",
        )));
    }
    Ok(decoded)
}

/// Encode a body as a single gzip member.
pub fn gzip_encode(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    encoder.finish()
}

/// Response writer compressing bodies once the status allows it.
pub struct GzipWriter<'s, W> {
    inner: W,
    settings: &'s CompressionSettings,
    committed: bool,
    active: bool,
    compressing: bool,
}

impl<'s, W: ResponseWriter> GzipWriter<'s, W> {
    pub fn new(inner: W, settings: &'s CompressionSettings) -> Self {
        Self {
            inner,
            settings,
            committed: false,
            active: false,
            compressing: false,
        }
    }

    /// Compression was switched on at header commit.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// A compress-and-flush call is in progress.
    pub fn is_compressing(&self) -> bool {
        self.compressing
    }

    fn allowed_content_type(&self) -> bool {
        let Some(content_type) = self
            .inner
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };
        let base = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim()
            .to_ascii_lowercase();
        self.settings.content_types.iter().any(|t| *t == base)
    }

    fn commit(&mut self, status: StatusCode) {
        if self.committed {
            return;
        }
        self.committed = true;
        if status != StatusCode::OK
            || !self.allowed_content_type()
            || self.inner.headers().contains_key(header::CONTENT_ENCODING)
        {
            return;
        }
        let Ok(token) = HeaderValue::from_str(&self.settings.token) else {
            return;
        };

        let headers = self.inner.headers_mut();
        headers.insert(header::CONTENT_ENCODING, token);
        headers.remove(header::CONTENT_LENGTH);
        headers.append(header::VARY, HeaderValue::from_static("accept-encoding"));
        self.active = true;
    }

    fn compress_and_flush(&mut self, buf: &[u8]) -> io::Result<usize> {
        let level = Compression::new(self.settings.level.min(9));
        let mut encoder = GzEncoder::new(Reentrant(self), level);
        if let Err(e) = encoder.write_all(buf) {
            let err = GatewayError::Codec(e);
            tracing::warn!(error = %err, "Compress response body failed");
            return Err(io::Error::other(err));
        }
        if let Err(e) = encoder.finish() {
            let err = GatewayError::BodyClose(e);
            tracing::warn!(error = %err, "Compressor close failed");
            return Err(io::Error::other(err));
        }
        Ok(buf.len())
    }
}

/// Routes the encoder's output back through the writer; the latch sends it
/// straight to the inner writer.
struct Reentrant<'a, 's, W>(&'a mut GzipWriter<'s, W>);

impl<W: ResponseWriter> Write for Reentrant<'_, '_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ResponseWriter::write(&mut *self.0, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: ResponseWriter> ResponseWriter for GzipWriter<'_, W> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.commit(status);
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.compressing {
            return self.inner.write(buf);
        }
        if !self.committed {
            self.write_header(StatusCode::OK);
        }
        if !self.active {
            return self.inner.write(buf);
        }

        self.compressing = true;
        let result = self.compress_and_flush(buf);
        self.compressing = false;
        result
    }
}

pub struct CompressionCodec<H> {
    settings: CompressionSettings,
    body_limit: usize,
    inner: H,
}

impl<H: Handler> CompressionCodec<H> {
    pub fn new(settings: CompressionSettings, body_limit: usize, inner: H) -> Self {
        Self {
            settings,
            body_limit,
            inner,
        }
    }

    async fn decode(&self, request: Request<Body>) -> Result<Request<Body>, GatewayError> {
        let (mut parts, body) = request.into_parts();
        let data = read_body(body, self.body_limit).await?;
        let decoded = gzip_decode(&data, self.body_limit)?;
        parts.headers.remove(header::CONTENT_ENCODING);
        parts.headers.remove(header::CONTENT_LENGTH);
        Ok(Request::from_parts(parts, Body::from(decoded)))
    }
}

#[async_trait]
impl<H: Handler> Handler for CompressionCodec<H> {
    async fn serve(&self, request: Request<Body>, writer: &mut dyn ResponseWriter) {
        let token = self.settings.token.as_str();
        let request = if header_lists_token(request.headers(), header::CONTENT_ENCODING, token) {
            let path = request.uri().path().to_string();
            match self.decode(request).await {
                Ok(request) => request,
                Err(e) => return e.respond(&path, writer),
            }
        } else {
            request
        };

        if header_lists_token(request.headers(), header::ACCEPT_ENCODING, token) {
            let mut compressed = GzipWriter::new(writer, &self.settings);
            self.inner.serve(request, &mut compressed).await;
        } else {
            self.inner.serve(request, writer).await;
        }
    }
}
