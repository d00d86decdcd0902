//! Fingerprint-bound session tokens.
//!
//! Tokens are HMAC-signed JWTs recording the subject, the client's user
//! agent and IP. A token is only honoured when presented by the same user
//! agent from the same peer address it was issued to.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Request},
};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GatewayError;
use crate::http::handler::{peer_addr, Handler};
use crate::http::writer::ResponseWriter;

/// Authenticated subject, attached to request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubjectId(pub i64);

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Expiry (seconds since epoch).
    pub exp: u64,
    /// Issue time (seconds since epoch).
    #[serde(default)]
    pub iat: u64,
    #[serde(rename = "UserAgent")]
    pub user_agent: String,
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "UID")]
    pub subject: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token is empty")]
    MissingToken,

    #[error("token expired")]
    Expired,

    #[error("unexpected signing method")]
    Algorithm,

    #[error("token parse error: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error("peer address unavailable")]
    UnknownPeer,

    #[error("user data changed, reauthentication required")]
    FingerprintMismatch,

    #[error("sign token error: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Sign arbitrary claims with HS256.
pub fn sign_claims(secret: &[u8], claims: &SessionClaims) -> Result<String, AuthError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(AuthError::Sign)
}

/// Issue a token binding `subject` to the client's user agent and IP.
pub fn issue_token(
    secret: &[u8],
    ttl: Duration,
    subject: i64,
    user_agent: &str,
    ip: &str,
) -> Result<String, AuthError> {
    let iat = now_secs();
    let claims = SessionClaims {
        exp: iat + ttl.as_secs(),
        iat,
        user_agent: user_agent.to_string(),
        ip: ip.to_string(),
        subject,
    };
    sign_claims(secret, &claims)
}

/// Verify signature, algorithm family and expiry; fingerprints are left to
/// the caller.
pub fn verify_token(secret: &[u8], token: &str) -> Result<SessionClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
    validation.leeway = 0;

    decode::<SessionClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => AuthError::Algorithm,
            _ => AuthError::Invalid(e),
        })
}

/// Full check of a request's token. Returns the authenticated subject.
pub fn check_request<B>(
    secret: &[u8],
    header: &HeaderName,
    request: &Request<B>,
) -> Result<SubjectId, AuthError> {
    let token = request
        .headers()
        .get(header)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingToken)?;
    let claims = verify_token(secret, token)?;

    // IPv4 clients on a dual-stack listener arrive as ::ffff:a.b.c.d.
    let ip = peer_addr(request)
        .ok_or(AuthError::UnknownPeer)?
        .ip()
        .to_canonical();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default();
    if claims.user_agent != user_agent || claims.ip != ip.to_string() {
        return Err(AuthError::FingerprintMismatch);
    }
    Ok(SubjectId(claims.subject))
}

/// Secret and redirect target for session checks.
#[derive(Clone)]
pub struct SessionKey {
    pub secret: Vec<u8>,
    pub redirect_url: HeaderValue,
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("secret", &"<redacted>")
            .field("redirect_url", &self.redirect_url)
            .finish()
    }
}

pub struct SessionAuthenticator<H> {
    session: Option<SessionKey>,
    header: HeaderName,
    inner: H,
}

impl<H: Handler> SessionAuthenticator<H> {
    pub fn new(session: Option<SessionKey>, header: HeaderName, inner: H) -> Self {
        Self {
            session,
            header,
            inner,
        }
    }
}

#[async_trait]
impl<H: Handler> Handler for SessionAuthenticator<H> {
    async fn serve(&self, mut request: Request<Body>, writer: &mut dyn ResponseWriter) {
        let Some(session) = &self.session else {
            return self.inner.serve(request, writer).await;
        };

        match check_request(&session.secret, &self.header, &request) {
            Ok(subject) => {
                if let Some(token) = request.headers().get(&self.header).cloned() {
                    writer.headers_mut().insert(self.header.clone(), token);
                }
                request.extensions_mut().insert(subject);
                self.inner.serve(request, writer).await;
            }
            Err(e) => {
                writer
                    .headers_mut()
                    .insert(header::LOCATION, session.redirect_url.clone());
                GatewayError::from(e).respond(request.uri().path(), writer);
            }
        }
    }
}
