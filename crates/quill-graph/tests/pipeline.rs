//! End-to-end pipeline tests against scripted capabilities.
//!
//! The stub model dispatches on the system prompt, so concurrent branches
//! get deterministic responses regardless of scheduling. The stub report
//! writer echoes the research memo back, which makes merge order visible
//! in the final report.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};

use quill_core::config::{AppConfig, ModelConfig, PipelineConfig, SearchConfig};
use quill_core::{
    ChatMessage, ChatModel, QuillError, ResearchEvent, Result, SearchHit, SearchProvider,
    StreamDelta,
};
use quill_graph::ResearchGraph;

const SAFE: &str = r#"{"is_safe": true, "violated_category": null}"#;
const UNSAFE_HATE: &str = r#"{"is_safe": false, "violated_category": "Hate"}"#;

/// Scripted chat model. Dispatches on the system prompt; the summarizer arm
/// echoes its query and the report arm either streams fixed tokens or, when
/// none are scripted, echoes the memo it was given.
struct StubModel {
    safety_json: String,
    queries_json: String,
    report_tokens: Vec<String>,
    summary_calls: AtomicUsize,
}

impl StubModel {
    fn new(safety_json: &str, queries: &[&str], report_tokens: &[&str]) -> Self {
        let quoted: Vec<String> = queries.iter().map(|q| format!("\"{q}\"")).collect();
        Self {
            safety_json: safety_json.to_string(),
            queries_json: format!(r#"{{"queries": [{}]}}"#, quoted.join(", ")),
            report_tokens: report_tokens.iter().map(|t| t.to_string()).collect(),
            summary_calls: AtomicUsize::new(0),
        }
    }
}

impl ChatModel for StubModel {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let system = messages.first().map(|m| m.content.clone()).unwrap_or_default();
        let user = messages.last().map(|m| m.content.clone()).unwrap_or_default();

        let texts: Vec<String> = if system.contains("content safety classifier") {
            vec![self.safety_json.clone()]
        } else if system.contains("research planner") {
            vec![self.queries_json.clone()]
        } else if system.contains("research analyst") {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            let query = user
                .lines()
                .next()
                .unwrap_or("")
                .trim_start_matches("Search query: ")
                .to_string();
            vec![format!("summary of {query}")]
        } else if self.report_tokens.is_empty() {
            vec![user]
        } else {
            self.report_tokens.clone()
        };

        let deltas: Vec<Result<StreamDelta>> = texts
            .into_iter()
            .map(|t| Ok(StreamDelta::TextDelta(t)))
            .chain(std::iter::once(Ok(StreamDelta::Done)))
            .collect();
        Box::pin(async move { Ok(stream::iter(deltas).boxed()) })
    }
}

/// Search stub: one hit per query, with optional per-query failure and an
/// optional artificial delay to skew branch completion order.
struct StubSearch {
    fail_queries: Vec<String>,
    delay_queries: Vec<String>,
    calls: AtomicUsize,
}

impl StubSearch {
    fn ok() -> Self {
        Self {
            fail_queries: vec![],
            delay_queries: vec![],
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(queries: &[&str]) -> Self {
        Self {
            fail_queries: queries.iter().map(|q| q.to_string()).collect(),
            delay_queries: vec![],
            calls: AtomicUsize::new(0),
        }
    }

    fn delayed(queries: &[&str]) -> Self {
        Self {
            fail_queries: vec![],
            delay_queries: queries.iter().map(|q| q.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl SearchProvider for StubSearch {
    fn search(&self, query: &str) -> BoxFuture<'_, Result<Vec<SearchHit>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query = query.to_string();
        Box::pin(async move {
            if self.delay_queries.contains(&query) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            if self.fail_queries.contains(&query) {
                return Err(QuillError::Search(format!("connection refused: {query}")));
            }
            Ok(vec![SearchHit {
                url: format!("https://example.com/{query}"),
                content: format!("results for {query}"),
            }])
        })
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        model: ModelConfig {
            model_id: "stub".to_string(),
            ..ModelConfig::default()
        },
        summary_model: None,
        search: SearchConfig {
            provider: "tavily".to_string(),
            api_key: "test".to_string(),
            search_depth: "basic".to_string(),
            exclude_domains: vec![],
            max_results: 5,
        },
        pipeline: PipelineConfig::default(),
        gateway: None,
    }
}

fn graph(model: Arc<StubModel>, search: Arc<StubSearch>) -> ResearchGraph {
    ResearchGraph::new(&test_config(), model.clone(), model, search)
}

async fn collect(graph: &ResearchGraph, topic: &str, query_count: usize) -> Vec<ResearchEvent> {
    let stream = graph.stream(topic, query_count);
    tokio::pin!(stream);
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

fn progress_contents(events: &[ResearchEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            ResearchEvent::Progress { content } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn safe_topic_streams_progress_tokens_and_one_end() {
    let model = Arc::new(StubModel::new(SAFE, &["q1", "q2"], &["RE", "PORT"]));
    let search = Arc::new(StubSearch::ok());
    let events = collect(&graph(model, search.clone()), "benign topic", 2).await;

    let progress = progress_contents(&events);
    assert_eq!(progress[0], "Checking topic safety");
    assert_eq!(progress[1], "Generating search queries");
    assert_eq!(*progress.last().unwrap(), "Writing report");
    assert_eq!(
        progress.iter().filter(|p| **p == "Searching the web").count(),
        2
    );
    assert_eq!(
        progress.iter().filter(|p| **p == "Summarizing findings").count(),
        2
    );

    // Report tokens come through verbatim, after all branch progress.
    let writing_at = events
        .iter()
        .position(|e| matches!(e, ResearchEvent::Progress { content } if content == "Writing report"))
        .unwrap();
    let streamed: Vec<&str> = events
        .iter()
        .enumerate()
        .filter_map(|(i, e)| match e {
            ResearchEvent::Stream { content } => {
                assert!(i > writing_at);
                Some(content.as_str())
            }
            _ => None,
        })
        .collect();
    assert_eq!(streamed, vec!["RE", "PORT"]);

    // Exactly one terminal event, and it is last.
    match events.last().unwrap() {
        ResearchEvent::End { queries, run_id } => {
            assert_eq!(queries, &["q1".to_string(), "q2".to_string()]);
            assert!(!run_id.0.is_empty());
        }
        other => panic!("expected end event, got {other:?}"),
    }
    let terminals = events
        .iter()
        .filter(|e| matches!(e, ResearchEvent::End { .. } | ResearchEvent::Error { .. }))
        .count();
    assert_eq!(terminals, 1);
    assert_eq!(search.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn buffered_run_returns_the_report() {
    let model = Arc::new(StubModel::new(SAFE, &["q1", "q2"], &["RE", "PORT"]));
    let report = graph(model, Arc::new(StubSearch::ok()))
        .run("benign topic", 2)
        .await
        .unwrap();
    assert_eq!(report, "REPORT");
}

#[tokio::test]
async fn unsafe_topic_emits_single_error_and_spawns_nothing() {
    let model = Arc::new(StubModel::new(UNSAFE_HATE, &["q1"], &[]));
    let search = Arc::new(StubSearch::ok());
    let events = collect(&graph(model.clone(), search.clone()), "unsafe topic", 2).await;

    assert_eq!(
        events,
        vec![
            ResearchEvent::Progress {
                content: "Checking topic safety".to_string()
            },
            ResearchEvent::Error {
                content: "Topic is flagged as unsafe: Hate".to_string()
            },
        ]
    );
    assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    assert_eq!(model.summary_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unsafe_topic_fails_the_buffered_run() {
    let model = Arc::new(StubModel::new(UNSAFE_HATE, &["q1"], &[]));
    let err = graph(model, Arc::new(StubSearch::ok()))
        .run("unsafe topic", 2)
        .await
        .unwrap_err();
    match err {
        QuillError::UnsafeTopic { category } => assert_eq!(category, "Hate"),
        other => panic!("expected unsafe-topic error, got {other:?}"),
    }
}

#[tokio::test]
async fn degraded_report_when_one_branch_fails() {
    let model = Arc::new(StubModel::new(SAFE, &["q1", "q2"], &[]));
    let search = Arc::new(StubSearch::failing(&["q1"]));
    let report = graph(model, search)
        .run("benign topic", 2)
        .await
        .unwrap();

    // The surviving branch still feeds the report; the failed one is absent.
    assert!(report.contains("summary of q2"));
    assert!(!report.contains("summary of q1"));
}

#[tokio::test]
async fn all_branches_failing_fails_the_run() {
    let model = Arc::new(StubModel::new(SAFE, &["q1", "q2"], &[]));
    let search = Arc::new(StubSearch::failing(&["q1", "q2"]));
    let events = collect(&graph(model, search), "benign topic", 2).await;

    let progress = progress_contents(&events);
    assert!(!progress.contains(&"Writing report"));
    match events.last().unwrap() {
        ResearchEvent::Error { content } => {
            assert_eq!(content, "Unable to search the web. Please try again.");
        }
        other => panic!("expected error event, got {other:?}"),
    }
    let terminals = events
        .iter()
        .filter(|e| matches!(e, ResearchEvent::End { .. } | ResearchEvent::Error { .. }))
        .count();
    assert_eq!(terminals, 1);
}

#[tokio::test]
async fn summaries_follow_query_order_not_arrival_order() {
    // Branch q1 finishes last, but its summary must still lead the memo.
    let model = Arc::new(StubModel::new(SAFE, &["q1", "q2", "q3"], &[]));
    let search = Arc::new(StubSearch::delayed(&["q1"]));
    let report = graph(model, search)
        .run("benign topic", 3)
        .await
        .unwrap();

    let p1 = report.find("summary of q1").unwrap();
    let p2 = report.find("summary of q2").unwrap();
    let p3 = report.find("summary of q3").unwrap();
    assert!(p1 < p2 && p2 < p3);
}

#[tokio::test]
async fn query_count_is_clamped_to_configured_bounds() {
    // The stub offers six queries; a request of ten must clamp to the
    // default maximum of five branches.
    let model = Arc::new(StubModel::new(
        SAFE,
        &["q1", "q2", "q3", "q4", "q5", "q6"],
        &[],
    ));
    let search = Arc::new(StubSearch::ok());
    let events = collect(&graph(model, search.clone()), "benign topic", 10).await;

    assert!(matches!(events.last().unwrap(), ResearchEvent::End { .. }));
    assert_eq!(search.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn dropping_the_stream_cancels_remaining_work() {
    let model = Arc::new(StubModel::new(SAFE, &["q1", "q2"], &[]));
    let search = Arc::new(StubSearch::delayed(&["q1", "q2"]));
    let g = graph(model.clone(), search.clone());

    {
        let stream = g.stream("benign topic", 2);
        tokio::pin!(stream);
        // Read one event, then walk away.
        let first = stream.next().await.unwrap();
        assert_eq!(
            first,
            ResearchEvent::Progress {
                content: "Checking topic safety".to_string()
            }
        );
    }

    // Give the abandoned run time to notice and stop before summarizing.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(model.summary_calls.load(Ordering::SeqCst), 0);
}
