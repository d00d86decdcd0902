//! Ingest gateway (v0.1)
//!
//! Serves the ingestion pipeline in front of an echo handler.
//!
//! ```text
//!     Client Request
//!     ─────▶ request id / timeout / body limit (tower-http)
//!            ─▶ instrumentor ─▶ subnet ─▶ decrypt ─▶ gzip ─▶ integrity ─▶ session
//!                                                                      ─▶ handler
//!     ◀───── buffered response (digest, encoding, token headers)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use ingest_gateway::config::{load_config, GatewayConfig};
use ingest_gateway::http::{EchoHandler, HttpServer};
use ingest_gateway::lifecycle::Shutdown;
use ingest_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "ingest-gateway")]
#[command(about = "Security and encoding gateway for metrics ingestion", long_about = None)]
struct Args {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!("ingest-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        max_body_size = config.security.max_body_size,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let handler = EchoHandler::new(config.security.max_body_size);
    let server = HttpServer::new(config.clone(), handler)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let mut serving = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        joined = &mut serving => joined??,
        _ = shutdown.trigger_on_signal() => {
            serving.await??;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
