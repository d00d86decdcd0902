//! HMAC-SHA256 body integrity.
//!
//! Inbound POST bodies are verified against the client's digest header.
//! Outbound, every write republishes the digest of the body written so far.

use std::io;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::GatewayError;
use crate::http::body::read_body;
use crate::http::handler::Handler;
use crate::http::writer::ResponseWriter;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `data` under `key`.
pub fn sign(data: &[u8], key: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Compare the digest of `data` with the client-supplied hex digest.
///
/// Skipped only when both the key and the digest are empty.
pub fn check_digest(data: &[u8], key: &[u8], digest: &str) -> Result<(), GatewayError> {
    if key.is_empty() && digest.is_empty() {
        return Ok(());
    }
    let expected = sign(data, key);
    if bool::from(expected.as_bytes().ct_eq(digest.as_bytes())) {
        Ok(())
    } else {
        Err(GatewayError::IntegrityMismatch(digest.to_string()))
    }
}

/// Writer stamping the cumulative body digest on every write.
///
/// The header carries the digest of the prefix written so far, so after the
/// last write it covers the whole body.
pub struct DigestWriter<W> {
    inner: W,
    key: Vec<u8>,
    header: HeaderName,
    body: Vec<u8>,
}

impl<W: ResponseWriter> DigestWriter<W> {
    pub fn new(inner: W, key: Vec<u8>, header: HeaderName) -> Self {
        Self {
            inner,
            key,
            header,
            body: Vec::new(),
        }
    }

    /// Publish the digest of the bytes accepted so far.
    fn stamp(&mut self) -> io::Result<()> {
        if self.body.is_empty() {
            self.inner.headers_mut().remove(&self.header);
            return Ok(());
        }
        let digest = sign(&self.body, &self.key);
        let value = HeaderValue::from_str(&digest)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.inner.headers_mut().insert(self.header.clone(), value);
        Ok(())
    }
}

impl<W: ResponseWriter> ResponseWriter for DigestWriter<W> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.key.is_empty() {
            return self.inner.write(buf);
        }

        // The header must be in place before the bytes go out; it is rolled
        // back to the accepted prefix if the inner write falls short.
        let accepted = self.body.len();
        self.body.extend_from_slice(buf);
        if let Err(e) = self.stamp() {
            self.body.truncate(accepted);
            return Err(e);
        }

        match self.inner.write(buf) {
            Ok(n) if n < buf.len() => {
                self.body.truncate(accepted + n);
                self.stamp()?;
                Ok(n)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.body.truncate(accepted);
                self.stamp()?;
                Err(e)
            }
        }
    }
}

pub struct IntegrityCodec<H> {
    key: Vec<u8>,
    header: HeaderName,
    body_limit: usize,
    inner: H,
}

impl<H: Handler> IntegrityCodec<H> {
    pub fn new(key: Option<Vec<u8>>, header: HeaderName, body_limit: usize, inner: H) -> Self {
        Self {
            key: key.unwrap_or_default(),
            header,
            body_limit,
            inner,
        }
    }

    async fn verify(&self, request: Request<Body>) -> Result<Request<Body>, GatewayError> {
        let digest = request
            .headers()
            .get(&self.header)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default();
        if self.key.is_empty() && digest.is_empty() {
            return Ok(request);
        }

        let (parts, body) = request.into_parts();
        let data = read_body(body, self.body_limit).await?;
        check_digest(&data, &self.key, &digest)?;
        Ok(Request::from_parts(parts, Body::from(data)))
    }
}

#[async_trait]
impl<H: Handler> Handler for IntegrityCodec<H> {
    async fn serve(&self, request: Request<Body>, writer: &mut dyn ResponseWriter) {
        let request = if request.method() == Method::POST {
            let path = request.uri().path().to_string();
            match self.verify(request).await {
                Ok(request) => request,
                Err(e) => return e.respond(&path, writer),
            }
        } else {
            request
        };

        if self.key.is_empty() {
            return self.inner.serve(request, writer).await;
        }
        let mut stamped = DigestWriter::new(writer, self.key.clone(), self.header.clone());
        self.inner.serve(request, &mut stamped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    use crate::http::writer::tests::FailingWriter;
    use crate::http::writer::BufferedResponse;

    const TEST_DIGEST: &str = "de79cc62d7da11c1f3049dbf73ba060497e3d4e7a07029fa6f48e75cfc681042";

    fn digest_header() -> HeaderName {
        HeaderName::from_static("hashsha256")
    }

    #[test]
    fn test_check_digest() {
        assert!(check_digest(b"", b"", "").is_ok());
        assert!(check_digest(b"test", b"default", TEST_DIGEST).is_ok());
        assert!(check_digest(b"test", b"default", "d1").is_err());
        // A configured key with no digest is a mismatch.
        assert!(check_digest(b"test", b"default", "").is_err());
    }

    #[test]
    fn test_writer_stamps_known_digest() {
        let mut sink = BufferedResponse::new();
        let mut writer = DigestWriter::new(&mut sink, b"default".to_vec(), digest_header());
        writer.write_all(b"test").unwrap();
        assert_eq!(writer.headers()[digest_header()], TEST_DIGEST);
    }

    #[test]
    fn test_writer_with_data_key() {
        let mut sink = BufferedResponse::new();
        let mut writer = DigestWriter::new(&mut sink, b"key".to_vec(), digest_header());
        writer.write_all(b"data").unwrap();
        assert_eq!(
            writer.headers()[digest_header()],
            "5031fe3d989c6d1537a013fa6e739da23463fdaec3b70137d828e36ace221bd0"
        );
    }

    #[test]
    fn test_writer_without_key_sets_nothing() {
        let mut sink = BufferedResponse::new();
        let mut writer = DigestWriter::new(&mut sink, Vec::new(), digest_header());
        writer.write_all(b"test").unwrap();
        assert!(writer.headers().get(digest_header()).is_none());
        assert_eq!(sink.body(), b"test");
    }

    #[test]
    fn test_failed_write_leaves_digest_of_sent_bytes() {
        let mut sink = FailingWriter::accepting(1);
        let mut writer = DigestWriter::new(&mut sink, b"default".to_vec(), digest_header());
        writer.write_all(b"te").unwrap();
        assert!(writer.write_all(b"st").is_err());

        assert_eq!(sink.body, b"te");
        assert_eq!(sink.headers["hashsha256"], sign(b"te", b"default").as_str());
    }

    #[test]
    fn test_failed_first_write_removes_digest() {
        let mut sink = FailingWriter::accepting(0);
        let mut writer = DigestWriter::new(&mut sink, b"default".to_vec(), digest_header());
        assert!(writer.write_all(b"test").is_err());

        assert!(sink.body.is_empty());
        assert!(sink.headers.get("hashsha256").is_none());
    }

    #[test]
    fn test_writer_publishes_cumulative_prefix_digest() {
        let mut sink = BufferedResponse::new();
        let mut writer = DigestWriter::new(&mut sink, b"default".to_vec(), digest_header());

        writer.write_all(b"te").unwrap();
        assert_eq!(writer.headers()[digest_header()], sign(b"te", b"default").as_str());

        writer.write_all(b"st").unwrap();
        assert_eq!(writer.headers()[digest_header()], TEST_DIGEST);
        assert_eq!(sink.body(), b"test");
    }

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn serve(&self, request: Request<Body>, writer: &mut dyn ResponseWriter) {
            let bytes = axum::body::to_bytes(request.into_body(), usize::MAX).await.unwrap();
            writer.write_all(&bytes).unwrap();
        }
    }

    fn post(body: &'static str, digest: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(Method::POST).uri("/update");
        if let Some(digest) = digest {
            builder = builder.header("HashSHA256", digest);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_codec_accepts_and_stamps() {
        let codec = IntegrityCodec::new(Some(b"default".to_vec()), digest_header(), 1024, Echo);
        let mut sink = BufferedResponse::new();
        codec.serve(post("test", Some(TEST_DIGEST)), &mut sink).await;

        assert_eq!(sink.status(), Some(StatusCode::OK));
        assert_eq!(sink.body(), b"test");
        assert_eq!(sink.headers()[digest_header()], TEST_DIGEST);
    }

    #[tokio::test]
    async fn test_codec_rejects_mismatch() {
        let codec = IntegrityCodec::new(Some(b"default".to_vec()), digest_header(), 1024, Echo);
        let mut sink = BufferedResponse::new();
        codec.serve(post("tesT", Some(TEST_DIGEST)), &mut sink).await;

        assert_eq!(sink.status(), Some(StatusCode::BAD_REQUEST));
        assert!(sink.body().is_empty());
    }

    #[tokio::test]
    async fn test_codec_without_key_passes_through() {
        let codec = IntegrityCodec::new(None, digest_header(), 1024, Echo);
        let mut sink = BufferedResponse::new();
        codec.serve(post("test", None), &mut sink).await;

        assert_eq!(sink.body(), b"test");
        assert!(sink.headers().get(digest_header()).is_none());
    }

    proptest! {
        #[test]
        fn prop_any_body_mutation_is_rejected(
            body in proptest::collection::vec(any::<u8>(), 1..256),
            key in proptest::collection::vec(any::<u8>(), 1..64),
            index in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let digest = sign(&body, &key);
            prop_assert!(check_digest(&body, &key, &digest).is_ok());

            let mut mutated = body.clone();
            mutated[index.index(body.len())] ^= flip;
            prop_assert!(check_digest(&mutated, &key, &digest).is_err());
        }

        #[test]
        fn prop_any_digest_mutation_is_rejected(
            body in proptest::collection::vec(any::<u8>(), 0..256),
            key in proptest::collection::vec(any::<u8>(), 1..64),
            index in any::<prop::sample::Index>(),
        ) {
            let digest = sign(&body, &key);
            let mut bytes = digest.into_bytes();
            let i = index.index(bytes.len());
            bytes[i] = if bytes[i] == b'0' { b'1' } else { b'0' };
            let mutated = String::from_utf8(bytes).unwrap();
            prop_assert!(check_digest(&body, &key, &mutated).is_err());
        }
    }
}
