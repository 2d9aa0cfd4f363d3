use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use quill_core::config::ModelConfig;
use quill_core::error::{QuillError, Result};
use quill_core::traits::ChatModel;
use quill_core::types::{ChatMessage, Role, StreamDelta};

use crate::streaming::{SseEvent, SseStream};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Google Gemini native API client.
pub struct GeminiModel {
    http: Client,
}

impl GeminiModel {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for GeminiModel {
    fn default() -> Self {
        Self::new()
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default, rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GeminiUsage {
    #[serde(default, rename = "promptTokenCount")]
    prompt_token_count: u64,
    #[serde(default, rename = "candidatesTokenCount")]
    candidates_token_count: u64,
}

// ── Conversion ───────────────────────────────────────────────────

fn convert_messages(messages: Vec<ChatMessage>) -> (Option<GeminiContent>, Vec<GeminiContent>) {
    let mut system = None;
    let mut contents = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                system = Some(GeminiContent {
                    role: None,
                    parts: vec![GeminiPart { text: msg.content }],
                });
            }
            Role::User => contents.push(GeminiContent {
                role: Some("user".into()),
                parts: vec![GeminiPart { text: msg.content }],
            }),
            Role::Assistant => contents.push(GeminiContent {
                role: Some("model".into()),
                parts: vec![GeminiPart { text: msg.content }],
            }),
        }
    }

    (system, contents)
}

fn parse_chunk(event: SseEvent) -> Vec<Result<StreamDelta>> {
    let chunk: GeminiStreamChunk = match serde_json::from_str(&event.data) {
        Ok(c) => c,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse Gemini SSE chunk");
            return vec![];
        }
    };

    let mut deltas = Vec::new();

    if let Some(candidate) = chunk.candidates.into_iter().next() {
        if let Some(content) = candidate.content {
            for part in content.parts {
                if !part.text.is_empty() {
                    deltas.push(Ok(StreamDelta::TextDelta(part.text)));
                }
            }
        }
        if candidate.finish_reason.is_some() {
            deltas.push(Ok(StreamDelta::Done));
        }
    }

    if let Some(usage) = chunk.usage_metadata {
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        }));
    }

    deltas
}

impl ChatModel for GeminiModel {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| QuillError::LlmRequest("Gemini requires an api_key".into()))?;

            let base = config.base_url.as_deref().unwrap_or(GEMINI_API_URL);
            let url = format!(
                "{}/{}:streamGenerateContent?alt=sse",
                base, config.model_id
            );

            let (system_instruction, contents) = convert_messages(messages);
            let body = GeminiRequest {
                contents,
                system_instruction,
                generation_config: Some(GenerationConfig {
                    max_output_tokens: config.max_tokens,
                    temperature: (config.temperature > 0.0).then_some(config.temperature),
                }),
            };

            let response = self
                .http
                .post(&url)
                .header("x-goog-api-key", api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| QuillError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(QuillError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let sse_stream = SseStream::new(response.bytes_stream());
            let delta_stream = sse_stream
                .map(|event| futures::stream::iter(parse_chunk(event)))
                .flatten();

            Ok(Box::pin(delta_stream) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}
