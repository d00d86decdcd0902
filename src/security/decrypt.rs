//! Chunked RSA-OAEP payload decryption.
//!
//! Clients encrypt request bodies block by block with the gateway's public
//! key. Each ciphertext block is exactly one modulus long; blocks are
//! decrypted independently and concatenated in order.

use std::path::Path;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request},
};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;

use crate::config::ConfigError;
use crate::error::GatewayError;
use crate::http::body::read_body;
use crate::http::handler::Handler;
use crate::http::writer::ResponseWriter;

/// SHA-256 output length, part of the OAEP overhead.
const OAEP_HASH_LEN: usize = 32;

/// Bytes OAEP adds to every plaintext chunk.
pub const OAEP_OVERHEAD: usize = 2 * OAEP_HASH_LEN + 2;

#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("message length {len} is not a multiple of block size {block}")]
    LengthMismatch { len: usize, block: usize },

    #[error("block {index} failed to decrypt: {source}")]
    Block {
        index: usize,
        #[source]
        source: rsa::Error,
    },

    #[error("encryption failed: {0}")]
    Encrypt(#[source] rsa::Error),

    #[error("{size}-byte modulus leaves no room for OAEP payload")]
    KeyTooSmall { size: usize },
}

/// Largest plaintext chunk one OAEP block can carry under `key`.
pub fn max_chunk_len(key: &RsaPublicKey) -> Result<usize, DecryptError> {
    let size = key.size();
    size.checked_sub(OAEP_OVERHEAD)
        .filter(|len| *len > 0)
        .ok_or(DecryptError::KeyTooSmall { size })
}

fn padding() -> Oaep {
    Oaep::new::<Sha256>()
}

/// Decrypt a sequence of ciphertext blocks. Fails without partial output.
pub fn decrypt_message(key: &RsaPrivateKey, msg: &[u8]) -> Result<Vec<u8>, DecryptError> {
    let block = key.size();
    if msg.len() % block != 0 {
        return Err(DecryptError::LengthMismatch {
            len: msg.len(),
            block,
        });
    }

    let mut plaintext = Vec::with_capacity(msg.len());
    for (index, chunk) in msg.chunks(block).enumerate() {
        let data = key
            .decrypt(padding(), chunk)
            .map_err(|source| DecryptError::Block { index, source })?;
        plaintext.extend_from_slice(&data);
    }
    Ok(plaintext)
}

/// Client-side counterpart: split into maximal OAEP chunks and encrypt each.
pub fn encrypt_payload(key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, DecryptError> {
    let block = key.size();
    let chunk_len = max_chunk_len(key)?;
    let mut rng = rand::thread_rng();

    let mut ciphertext = Vec::with_capacity(plaintext.len().div_ceil(chunk_len) * block);
    for chunk in plaintext.chunks(chunk_len) {
        let data = key
            .encrypt(&mut rng, padding(), chunk)
            .map_err(DecryptError::Encrypt)?;
        ciphertext.extend_from_slice(&data);
    }
    Ok(ciphertext)
}

/// Load a PEM private key in PKCS#1 or PKCS#8 form.
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey, ConfigError> {
    let pem = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    RsaPrivateKey::from_pkcs1_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
        .map_err(|e| ConfigError::Key(format!("{}: {}", path.display(), e)))
}

/// Load a PEM public key in PKCS#1 or SPKI form.
pub fn load_public_key(path: &Path) -> Result<RsaPublicKey, ConfigError> {
    let pem = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    RsaPublicKey::from_pkcs1_pem(&pem)
        .or_else(|_| RsaPublicKey::from_public_key_pem(&pem))
        .map_err(|e| ConfigError::Key(format!("{}: {}", path.display(), e)))
}

pub struct PayloadDecryptor<H> {
    key: Option<RsaPrivateKey>,
    body_limit: usize,
    inner: H,
}

impl<H: Handler> PayloadDecryptor<H> {
    pub fn new(key: Option<RsaPrivateKey>, body_limit: usize, inner: H) -> Self {
        Self {
            key,
            body_limit,
            inner,
        }
    }
}

#[async_trait]
impl<H: Handler> Handler for PayloadDecryptor<H> {
    async fn serve(&self, request: Request<Body>, writer: &mut dyn ResponseWriter) {
        let Some(key) = &self.key else {
            return self.inner.serve(request, writer).await;
        };
        if request.method() != Method::POST && request.method() != Method::PUT {
            return self.inner.serve(request, writer).await;
        }

        let path = request.uri().path().to_string();
        let (mut parts, body) = request.into_parts();
        let plaintext = match read_body(body, self.body_limit).await {
            Ok(bytes) => decrypt_message(key, &bytes).map_err(GatewayError::from),
            Err(e) => Err(e),
        };
        let plaintext = match plaintext {
            Ok(plaintext) => plaintext,
            Err(e) => return e.respond(&path, writer),
        };

        parts.headers.remove(header::CONTENT_LENGTH);
        let request = Request::from_parts(parts, Body::from(plaintext));
        self.inner.serve(request, writer).await;
    }
}
