use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use quill_core::config::{GatewayConfig, PipelineConfig};
use quill_graph::ResearchGraph;

use crate::ratelimit::RateLimiter;
use crate::routes;
use crate::state::AppState;

/// HTTP/SSE gateway server built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    pipeline: PipelineConfig,
    graph: Arc<ResearchGraph>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, pipeline: PipelineConfig, graph: Arc<ResearchGraph>) -> Self {
        Self {
            config,
            pipeline,
            graph,
        }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            pipeline: self.pipeline.clone(),
            graph: self.graph.clone(),
            limiter: RateLimiter::new(
                Duration::from_secs(self.config.rate_limit_window_secs),
                self.config.rate_limit_max_requests,
            ),
        });

        let app = Router::new()
            .route("/api/health", get(routes::health))
            .route("/api/invoke", post(routes::invoke))
            .route("/api/stream", post(routes::stream))
            .route("/api/feedback", post(routes::feedback))
            .layer(CorsLayer::permissive())
            .with_state(state);

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

        info!("Gateway shut down");
        Ok(())
    }
}
