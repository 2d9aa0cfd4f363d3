use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one pipeline run. Returned in the terminal `end`
/// event and used to key feedback submissions.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a chat exchange.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message. The pipeline never sends tool calls or
/// multi-block content, so a flat role + text pair is all providers need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
}

/// A streaming delta from a chat model.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// The response is complete.
    Done,

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// One web search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub content: String,
}

/// Consumer-facing event emitted by a streaming run. Exactly one of
/// `End`/`Error` terminates the sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum ResearchEvent {
    /// A pipeline stage started.
    Progress { content: String },
    /// A token of the report as it is written.
    Stream { content: String },
    /// The run completed; carries the generated queries and the run id.
    End { queries: Vec<String>, run_id: RunId },
    /// The run terminated with a user-safe message.
    Error { content: String },
}

impl ResearchEvent {
    /// SSE event name for this kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ResearchEvent::Progress { .. } => "progress",
            ResearchEvent::Stream { .. } => "stream",
            ResearchEvent::End { .. } => "end",
            ResearchEvent::Error { .. } => "error",
        }
    }

    /// SSE data payload. The kind travels as the event name, not in the body.
    pub fn data(&self) -> serde_json::Value {
        match self {
            ResearchEvent::Progress { content } | ResearchEvent::Stream { content } => {
                serde_json::json!({ "content": content })
            }
            ResearchEvent::End { queries, run_id } => {
                serde_json::json!({ "queries": queries, "runId": run_id })
            }
            ResearchEvent::Error { content } => serde_json::json!({ "content": content }),
        }
    }
}
