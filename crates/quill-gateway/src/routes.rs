use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tracing::info;

use quill_core::error::GENERIC_FAILURE_MESSAGE;
use quill_core::{QuillError, RunId};

use crate::middleware::Authenticated;
use crate::state::AppState;

type Rejection = (StatusCode, Json<serde_json::Value>);

fn reject(status: StatusCode, detail: &str) -> Rejection {
    (status, Json(serde_json::json!({ "detail": detail })))
}

// GET /api/health — no auth required
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    #[serde(default, alias = "queryCount")]
    pub query_count: Option<usize>,
}

/// Validate a research request and resolve the effective query count.
fn validate(state: &AppState, body: &ResearchRequest) -> Result<usize, Rejection> {
    if body.topic.trim().is_empty() {
        return Err(reject(
            StatusCode::UNPROCESSABLE_ENTITY,
            "topic must not be empty",
        ));
    }
    let count = body.query_count.unwrap_or(state.pipeline.min_queries);
    if count < state.pipeline.min_queries || count > state.pipeline.max_queries {
        return Err(reject(
            StatusCode::UNPROCESSABLE_ENTITY,
            &format!(
                "query_count must be between {} and {}",
                state.pipeline.min_queries, state.pipeline.max_queries
            ),
        ));
    }
    Ok(count)
}

fn check_rate_limit(state: &AppState, addr: &SocketAddr) -> Result<(), Rejection> {
    if state.limiter.check(&addr.ip().to_string()) {
        Ok(())
    } else {
        Err(reject(
            StatusCode::TOO_MANY_REQUESTS,
            "rate limit exceeded, try again later",
        ))
    }
}

// POST /api/invoke — buffered run, returns the finished report
pub async fn invoke(
    Authenticated(auth): Authenticated,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<ResearchRequest>,
) -> Result<Json<serde_json::Value>, Rejection> {
    check_rate_limit(&state, &addr)?;
    let query_count = validate(&state, &body)?;
    info!(client = %auth.name, topic = %body.topic, query_count, "invoke request");

    match state.graph.run(&body.topic, query_count).await {
        Ok(report) => Ok(Json(serde_json::json!({
            "topic": body.topic,
            "report": report,
        }))),
        Err(QuillError::UnsafeTopic { category }) => Ok(Json(serde_json::json!({
            "error": format!("Topic is flagged as unsafe: {category}"),
        }))),
        Err(e) => {
            let message = e.domain_message().unwrap_or(GENERIC_FAILURE_MESSAGE);
            Ok(Json(serde_json::json!({ "error": message })))
        }
    }
}

// POST /api/stream — streaming run over SSE
pub async fn stream(
    Authenticated(auth): Authenticated,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<ResearchRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Rejection> {
    check_rate_limit(&state, &addr)?;
    let query_count = validate(&state, &body)?;

    let run_id = RunId::new();
    info!(client = %auth.name, run_id = %run_id, topic = %body.topic, "stream request");

    let events = state
        .graph
        .stream_with_id(&body.topic, query_count, run_id)
        .map(|ev| Ok(Event::default().event(ev.kind()).data(ev.data().to_string())));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[derive(Deserialize)]
pub struct FeedbackRequest {
    #[serde(alias = "runId")]
    pub run_id: String,
    pub score: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

// POST /api/feedback — record a rating for a finished run
pub async fn feedback(
    Authenticated(_auth): Authenticated,
    State(_state): State<Arc<AppState>>,
    Json(body): Json<FeedbackRequest>,
) -> Result<Json<serde_json::Value>, Rejection> {
    if body.run_id.trim().is_empty() {
        return Err(reject(
            StatusCode::UNPROCESSABLE_ENTITY,
            "run_id must not be empty",
        ));
    }
    if !(1..=5).contains(&body.score) {
        return Err(reject(
            StatusCode::UNPROCESSABLE_ENTITY,
            "score must be between 1 and 5",
        ));
    }

    info!(
        run_id = %body.run_id,
        score = body.score,
        comment = body.comment.as_deref().unwrap_or(""),
        "feedback received"
    );
    Ok(Json(serde_json::json!({ "status": "received" })))
}
