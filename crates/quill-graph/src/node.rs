//! The pipeline's nodes.
//!
//! Each node reads the state it is given, calls at most one capability, and
//! returns a [`StateUpdate`]. Capability failures are wrapped into a node
//! error carrying a user-safe message; everything else propagates untouched
//! so the executor can tell domain failures from infrastructure ones.

use std::sync::Arc;

use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error};

use quill_core::config::ModelConfig;
use quill_core::{ChatMessage, ChatModel, QuillError, Result, SearchProvider, StreamDelta};

use crate::prompts;
use crate::state::{BranchState, RunState, StateUpdate};

/// Identity of a node, used in trace events and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    SafetyCheck,
    GenerateQueries,
    SearchWeb,
    Summarize,
    WriteReport,
}

impl NodeKind {
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::SafetyCheck => "safety_check",
            NodeKind::GenerateQueries => "generate_queries",
            NodeKind::SearchWeb => "search_web",
            NodeKind::Summarize => "summarize",
            NodeKind::WriteReport => "write_report",
        }
    }
}

/// Wrap a capability failure into a node error with a user-safe message.
pub(crate) fn node_failure(kind: NodeKind, source: &QuillError) -> QuillError {
    error!(node = kind.name(), error = %source, "node capability call failed");
    let message = match kind {
        NodeKind::SafetyCheck => "Unable to verify the topic is safe to research. Please try again.",
        NodeKind::GenerateQueries => "Unable to generate queries. Please try again.",
        NodeKind::SearchWeb => "Unable to search the web. Please try again.",
        NodeKind::Summarize => "Unable to summarize search results. Please try again.",
        NodeKind::WriteReport => "Unable to write the report. Please try again.",
    };
    QuillError::Node {
        node: kind.name(),
        message: message.to_string(),
    }
}

/// Parse a model response that should be a single JSON object. Models wrap
/// JSON in code fences or preamble often enough that we extract the outermost
/// object before giving up.
fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }
    Err(QuillError::LlmParse(format!(
        "response is not a JSON object: {}",
        truncate(trimmed, 200)
    )))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug, Deserialize)]
struct SafetyVerdict {
    is_safe: bool,
    #[serde(default)]
    violated_category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchQueries {
    queries: Vec<String>,
}

/// Gate node: classifies the topic before any research happens.
#[derive(Clone)]
pub struct SafetyCheckNode {
    chat: Arc<dyn ChatModel>,
    model: ModelConfig,
}

impl SafetyCheckNode {
    pub fn new(chat: Arc<dyn ChatModel>, model: ModelConfig) -> Self {
        Self { chat, model }
    }

    pub async fn run(&self, state: &RunState) -> Result<StateUpdate> {
        debug!(topic = %state.topic, "checking topic safety");
        let messages = vec![
            ChatMessage::system(prompts::SAFETY_CHECK),
            ChatMessage::user(format!("Research topic: {}", state.topic)),
        ];
        let kind = NodeKind::SafetyCheck;
        let text = self
            .chat
            .complete(&self.model, messages)
            .await
            .map_err(|e| node_failure(kind, &e))?;
        let verdict: SafetyVerdict =
            parse_structured(&text).map_err(|e| node_failure(kind, &e))?;
        Ok(StateUpdate::Safety {
            is_safe: verdict.is_safe,
            violated_category: verdict.violated_category,
        })
    }
}

/// Decomposes the topic into `query_count` search queries.
#[derive(Clone)]
pub struct QueryGeneratorNode {
    chat: Arc<dyn ChatModel>,
    model: ModelConfig,
}

impl QueryGeneratorNode {
    pub fn new(chat: Arc<dyn ChatModel>, model: ModelConfig) -> Self {
        Self { chat, model }
    }

    pub async fn run(&self, state: &RunState) -> Result<StateUpdate> {
        debug!(topic = %state.topic, count = state.query_count, "generating search queries");
        let messages = vec![
            ChatMessage::system(prompts::GENERATE_QUERIES),
            ChatMessage::user(format!(
                "Research topic: {}\n\nGenerate exactly {} queries.",
                state.topic, state.query_count
            )),
        ];
        let kind = NodeKind::GenerateQueries;
        let text = self
            .chat
            .complete(&self.model, messages)
            .await
            .map_err(|e| node_failure(kind, &e))?;
        let parsed: SearchQueries = parse_structured(&text).map_err(|e| node_failure(kind, &e))?;
        let mut queries = parsed.queries;
        if queries.is_empty() {
            return Err(node_failure(
                kind,
                &QuillError::LlmParse("model returned no queries".to_string()),
            ));
        }
        // More queries than asked for is a soft failure: keep the first N.
        queries.truncate(state.query_count);
        Ok(StateUpdate::Queries(queries))
    }
}

/// Branch node: runs one web search and formats the hits for the summarizer.
#[derive(Clone)]
pub struct WebSearchNode {
    search: Arc<dyn SearchProvider>,
}

impl WebSearchNode {
    pub fn new(search: Arc<dyn SearchProvider>) -> Self {
        Self { search }
    }

    pub async fn run(&self, state: &BranchState) -> Result<StateUpdate> {
        debug!(query = %state.query, "searching the web");
        let hits = self
            .search
            .search(&state.query)
            .await
            .map_err(|e| node_failure(NodeKind::SearchWeb, &e))?;
        let docs = hits
            .into_iter()
            .map(|hit| format!("<Document href=\"{}\"/>\n{}\n</Document>", hit.url, hit.content))
            .collect();
        Ok(StateUpdate::SearchDocs(docs))
    }
}

/// Branch node: condenses one branch's search results into a summary.
#[derive(Clone)]
pub struct SummaryNode {
    chat: Arc<dyn ChatModel>,
    model: ModelConfig,
}

impl SummaryNode {
    pub fn new(chat: Arc<dyn ChatModel>, model: ModelConfig) -> Self {
        Self { chat, model }
    }

    pub async fn run(&self, state: &BranchState) -> Result<StateUpdate> {
        debug!(query = %state.query, docs = state.search_docs.len(), "summarizing search results");
        let messages = vec![
            ChatMessage::system(prompts::SUMMARIZE),
            ChatMessage::user(format!(
                "Search query: {}\n\nSearch results:\n\n{}",
                state.query,
                state.search_docs.join("\n-----\n")
            )),
        ];
        let summary = self
            .chat
            .complete(&self.model, messages)
            .await
            .map_err(|e| node_failure(NodeKind::Summarize, &e))?;
        Ok(StateUpdate::Summaries(vec![summary]))
    }
}

/// Final node: synthesizes the branch summaries into the report.
///
/// Unlike the other nodes this one exposes its stream; the executor drains it
/// so report tokens can be forwarded to the consumer as they arrive.
#[derive(Clone)]
pub struct ReportWriterNode {
    chat: Arc<dyn ChatModel>,
    model: ModelConfig,
}

impl ReportWriterNode {
    pub fn new(chat: Arc<dyn ChatModel>, model: ModelConfig) -> Self {
        Self { chat, model }
    }

    fn messages(&self, state: &RunState) -> Vec<ChatMessage> {
        let mut memo = format!("Research topic: {}\n\n=== RESEARCH MEMO ===\n", state.topic);
        for (idx, summary) in state.summaries.iter().enumerate() {
            memo.push_str(&format!("\n--- Finding {} ---\n{}\n", idx + 1, summary));
        }
        memo.push_str("\n=== END MEMO ===");
        vec![ChatMessage::system(prompts::WRITE_REPORT), ChatMessage::user(memo)]
    }

    pub async fn open_stream<'a>(
        &'a self,
        state: &RunState,
    ) -> Result<BoxStream<'a, Result<StreamDelta>>> {
        debug!(summaries = state.summaries.len(), "writing report");
        let messages = self.messages(state);
        self.chat
            .chat_stream(&self.model, messages)
            .await
            .map_err(|e| node_failure(NodeKind::WriteReport, &e))
    }
}
