use std::sync::Arc;

use quill_core::config::{GatewayConfig, PipelineConfig};
use quill_graph::ResearchGraph;

use crate::ratelimit::RateLimiter;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub pipeline: PipelineConfig,
    pub graph: Arc<ResearchGraph>,
    pub limiter: RateLimiter,
}
