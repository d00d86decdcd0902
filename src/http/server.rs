//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the composed pipeline as fallback
//! - Wire up transport middleware (request ID, tracing, timeout, body limit)
//! - Attach connect info so stages can see the peer address
//! - Serve until the shutdown channel fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ConfigError, GatewayConfig};
use crate::http::handler::Handler;
use crate::http::pipeline::{self, Pipeline};
use crate::http::writer::BufferedResponse;
use crate::lifecycle::ShutdownSignal;

const X_REQUEST_ID: &str = "x-request-id";

/// HTTP server fronting a handler with the ingestion pipeline.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    /// Compose the pipeline around `handler`. Fails if key material named
    /// by the config cannot be loaded.
    pub fn new<H: Handler>(config: GatewayConfig, handler: H) -> Result<Self, ConfigError> {
        let pipeline = Arc::new(pipeline::from_config(&config, handler)?);
        let router = Self::build_router(&config, pipeline);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router<H: Handler>(config: &GatewayConfig, pipeline: Arc<Pipeline<H>>) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);
        Router::new()
            .fallback(serve_pipeline::<H>)
            .with_state(pipeline)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
                    .layer(PropagateRequestIdLayer::new(request_id)),
            )
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires or its coordinator is dropped.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Run one request through the pipeline into a buffered response.
async fn serve_pipeline<H: Handler>(
    State(pipeline): State<Arc<Pipeline<H>>>,
    request: Request<Body>,
) -> Response {
    let mut sink = BufferedResponse::new();
    pipeline.serve(request, &mut sink).await;
    sink.into_response()
}
