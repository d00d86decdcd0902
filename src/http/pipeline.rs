//! Pipeline composition.
//!
//! ```text
//! transport
//!   → ResponseInstrumentor   (logs, metrics)
//!   → SubnetFilter           (403)
//!   → PayloadDecryptor       (400)
//!   → CompressionCodec       (500 on malformed gzip)
//!   → IntegrityCodec         (400)
//!   → SessionAuthenticator   (401 + Location)
//!   → handler
//! ```
//!
//! Stages are composed once from immutable settings. Writer decorators are
//! created per request inside each stage.

use axum::http::HeaderValue;
use ipnet::IpNet;
use rsa::RsaPrivateKey;

use crate::config::validation::ValidationError;
use crate::config::{ConfigError, GatewayConfig};
use crate::http::compression::CompressionCodec;
use crate::http::handler::Handler;
use crate::http::settings::PipelineSettings;
use crate::observability::instrument::ResponseInstrumentor;
use crate::security::auth::{SessionAuthenticator, SessionKey};
use crate::security::decrypt::{load_private_key, PayloadDecryptor};
use crate::security::integrity::IntegrityCodec;
use crate::security::subnet::SubnetFilter;

/// The composed stage chain around a terminal handler `H`.
pub type Pipeline<H> = ResponseInstrumentor<
    SubnetFilter<PayloadDecryptor<CompressionCodec<IntegrityCodec<SessionAuthenticator<H>>>>>,
>;

/// Key material and policy the stages are built from. Every field is
/// optional; an absent field disables the corresponding check.
#[derive(Default)]
pub struct PipelineKeys {
    pub subnet: Option<IpNet>,
    pub private_key: Option<RsaPrivateKey>,
    pub hash_key: Option<Vec<u8>>,
    pub session: Option<SessionKey>,
}

impl PipelineKeys {
    /// Resolve key material named by the config. Reads the private key
    /// from disk.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let subnet = config
            .security
            .trusted_subnet
            .as_deref()
            .map(|s| {
                s.parse::<IpNet>()
                    .map_err(|_| ValidationError::Subnet(s.to_string()))
            })
            .transpose()?;

        let private_key = config
            .security
            .private_key_path
            .as_deref()
            .map(load_private_key)
            .transpose()?;

        let hash_key = config
            .security
            .hash_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .map(|k| k.as_bytes().to_vec());

        let session = match &config.session.secret {
            Some(secret) => {
                let redirect_url = HeaderValue::from_str(&config.session.redirect_url).map_err(
                    |_| ValidationError::RedirectUrl(config.session.redirect_url.clone()),
                )?;
                Some(SessionKey {
                    secret: secret.as_bytes().to_vec(),
                    redirect_url,
                })
            }
            None => None,
        };

        Ok(Self {
            subnet,
            private_key,
            hash_key,
            session,
        })
    }
}

/// Wrap `handler` in the full stage chain.
pub fn compose<H: Handler>(settings: PipelineSettings, keys: PipelineKeys, handler: H) -> Pipeline<H> {
    let PipelineSettings {
        headers,
        compression,
        body_limit,
    } = settings;

    let auth = SessionAuthenticator::new(keys.session, headers.token, handler);
    let integrity = IntegrityCodec::new(keys.hash_key, headers.digest, body_limit, auth);
    let codec = CompressionCodec::new(compression, body_limit, integrity);
    let decryptor = PayloadDecryptor::new(keys.private_key, body_limit, codec);
    let filter = SubnetFilter::new(keys.subnet, headers.real_ip, decryptor);
    ResponseInstrumentor::new(filter)
}

/// Build the pipeline described by a validated config.
pub fn from_config<H: Handler>(config: &GatewayConfig, handler: H) -> Result<Pipeline<H>, ConfigError> {
    let settings = PipelineSettings::from_config(config)?;
    let keys = PipelineKeys::from_config(config)?;

    tracing::info!(
        subnet = keys.subnet.is_some(),
        decryption = keys.private_key.is_some(),
        integrity = keys.hash_key.is_some(),
        sessions = keys.session.is_some(),
        body_limit = settings.body_limit,
        "Pipeline composed"
    );
    Ok(compose(settings, keys, handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Method, Request, StatusCode};

    use crate::http::compression::{gzip_decode, gzip_encode};
    use crate::http::handler::EchoHandler;
    use crate::http::writer::{BufferedResponse, ResponseWriter};
    use crate::security::auth::{issue_token, SubjectId};
    use crate::security::decrypt::encrypt_payload;
    use crate::security::decrypt::tests::test_key;
    use crate::security::integrity::sign;

    const HASH_KEY: &[u8] = b"default";
    const SECRET: &[u8] = b"session-secret";

    fn full_keys() -> PipelineKeys {
        PipelineKeys {
            subnet: Some("10.0.0.0/8".parse().unwrap()),
            private_key: Some(test_key().clone()),
            hash_key: Some(HASH_KEY.to_vec()),
            session: Some(SessionKey {
                secret: SECRET.to_vec(),
                redirect_url: HeaderValue::from_static("/login"),
            }),
        }
    }

    /// Client-side chain: sign, gzip, encrypt.
    fn encoded_post(plain: &[u8], token: &str) -> Request<Body> {
        let digest = sign(plain, HASH_KEY);
        let gz = gzip_encode(plain, 6).unwrap();
        let enc = encrypt_payload(&test_key().to_public_key(), &gz).unwrap();

        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/updates")
            .header(header::CONTENT_ENCODING, "gzip")
            .header(header::ACCEPT_ENCODING, "gzip")
            .header(header::USER_AGENT, "A")
            .header("Authorization", token)
            .header("HashSHA256", digest)
            .body(Body::from(enc))
            .unwrap();
        let peer: SocketAddr = "10.1.2.3:5000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    }

    #[tokio::test]
    async fn test_full_chain_round_trip() {
        let pipeline = compose(PipelineSettings::default(), full_keys(), EchoHandler::new(1 << 20));
        let token = issue_token(SECRET, Duration::from_secs(60), 7, "A", "10.1.2.3").unwrap();

        let mut sink = BufferedResponse::new();
        pipeline.serve(encoded_post(b"cpu 0.5", &token), &mut sink).await;

        assert_eq!(sink.status(), Some(StatusCode::OK));
        assert_eq!(sink.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(sink.headers()["authorization"], token.as_str());

        let body = gzip_decode(sink.body(), 1 << 20).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["subject"], 7);
        assert_eq!(json["body"], "cpu 0.5");

        // Digest covers the uncompressed bytes the handler wrote.
        assert_eq!(sink.headers()["hashsha256"], sign(&body, HASH_KEY).as_str());
    }

    #[tokio::test]
    async fn test_stage_failures_map_to_status() {
        let pipeline = compose(PipelineSettings::default(), full_keys(), EchoHandler::new(1 << 20));
        let token = issue_token(SECRET, Duration::from_secs(60), 7, "A", "10.1.2.3").unwrap();

        // Outside the subnet.
        let mut request = encoded_post(b"cpu 0.5", &token);
        request.headers_mut().insert("x-real-ip", HeaderValue::from_static("192.168.1.1"));
        let mut sink = BufferedResponse::new();
        pipeline.serve(request, &mut sink).await;
        assert_eq!(sink.status(), Some(StatusCode::FORBIDDEN));

        // Digest over a different body.
        let mut request = encoded_post(b"cpu 0.5", &token);
        request
            .headers_mut()
            .insert("hashsha256", HeaderValue::from_str(&sign(b"cpu 0.6", HASH_KEY)).unwrap());
        let mut sink = BufferedResponse::new();
        pipeline.serve(request, &mut sink).await;
        assert_eq!(sink.status(), Some(StatusCode::BAD_REQUEST));

        // Different user agent.
        let mut request = encoded_post(b"cpu 0.5", &token);
        request.headers_mut().insert(header::USER_AGENT, HeaderValue::from_static("B"));
        let mut sink = BufferedResponse::new();
        pipeline.serve(request, &mut sink).await;
        assert_eq!(sink.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(sink.headers()[header::LOCATION], "/login");
    }

    struct Subject;

    #[async_trait]
    impl Handler for Subject {
        async fn serve(&self, request: Request<Body>, writer: &mut dyn ResponseWriter) {
            let id = request.extensions().get::<SubjectId>().map(|s| s.0);
            writer.write_all(format!("{id:?}").as_bytes()).unwrap();
        }
    }

    #[tokio::test]
    async fn test_empty_keys_pass_everything() {
        let pipeline = compose(PipelineSettings::default(), PipelineKeys::default(), Subject);
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let mut sink = BufferedResponse::new();
        pipeline.serve(request, &mut sink).await;
        assert_eq!(sink.status(), Some(StatusCode::OK));
        assert_eq!(sink.body(), b"None");
        assert!(sink.headers().get("hashsha256").is_none());
    }

    #[test]
    fn test_keys_from_config() {
        let mut config = GatewayConfig::default();
        config.security.trusted_subnet = Some("127.0.0.1/32".into());
        config.security.hash_key = Some(String::new());
        config.session.secret = Some("s".into());

        let keys = PipelineKeys::from_config(&config).unwrap();
        assert_eq!(keys.subnet, Some("127.0.0.1/32".parse().unwrap()));
        assert!(keys.hash_key.is_none());
        assert!(keys.private_key.is_none());
        assert_eq!(keys.session.unwrap().redirect_url, "/login");
    }

    #[test]
    fn test_missing_private_key_file() {
        let mut config = GatewayConfig::default();
        config.security.private_key_path = Some("/nonexistent/gateway.pem".into());
        assert!(matches!(
            PipelineKeys::from_config(&config),
            Err(ConfigError::Io(_))
        ));
    }
}
