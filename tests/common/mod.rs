//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use ingest_gateway::config::GatewayConfig;
use ingest_gateway::http::{EchoHandler, HttpServer};
use ingest_gateway::lifecycle::Shutdown;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use tokio::net::TcpListener;

/// Start the gateway with an echo handler on `addr`. Dropping or triggering
/// the returned coordinator stops it.
pub async fn start_gateway(addr: SocketAddr, mut config: GatewayConfig) -> Shutdown {
    config.listener.bind_address = addr.to_string();
    let handler = EchoHandler::new(config.security.max_body_size);
    let server = HttpServer::new(config, handler).unwrap();
    let listener = TcpListener::bind(addr).await.unwrap();

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, signal).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown
}

/// Process-wide RSA key, small enough to generate quickly in debug builds.
#[allow(dead_code)]
pub fn test_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap())
}

/// Write the test key as PKCS#1 PEM under a unique temp path.
#[allow(dead_code)]
pub fn write_test_key(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("ingest-gateway-{}-{}.pem", name, std::process::id()));
    let pem = test_key().to_pkcs1_pem(LineEnding::LF).unwrap();
    std::fs::write(&path, pem.as_bytes()).unwrap();
    path
}
