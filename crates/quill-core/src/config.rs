use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QuillError, Result};

/// Top-level Quill configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Primary chat model: safety check, query generation, report writing.
    pub model: ModelConfig,
    /// Model for branch summaries. Falls back to `model` when absent.
    #[serde(default)]
    pub summary_model: Option<ModelConfig>,
    pub search: SearchConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: String::new(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: None,
        }
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for chat requests. Retries live in the provider
/// wrapper; pipeline nodes are single-shot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Web search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    pub api_key: String,
    #[serde(default = "default_search_depth")]
    pub search_depth: String,
    #[serde(default)]
    pub exclude_domains: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_search_provider() -> String { "tavily".to_string() }
fn default_search_depth() -> String { "basic".to_string() }
fn default_max_results() -> usize { 5 }

/// Execution-engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Lower bound on queries per run; requests below it are clamped.
    #[serde(default = "default_min_queries")]
    pub min_queries: usize,
    /// Upper bound on queries per run; requests above it are clamped.
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,
    /// Capacity of the bounded trace-event channel. Slow consumers apply
    /// backpressure to the executor rather than buffering unboundedly.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_queries: default_min_queries(),
            max_queries: default_max_queries(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_min_queries() -> usize { 2 }
fn default_max_queries() -> usize { 5 }
fn default_channel_capacity() -> usize { 64 }

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Expected value of the X-API-Key header. None = anonymous access.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_rate_window")]
    pub rate_limit_window_secs: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_max_requests: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_key: None,
            rate_limit_window_secs: default_rate_window(),
            rate_limit_max_requests: default_rate_limit(),
        }
    }
}

fn default_bind() -> String { "127.0.0.1:8080".to_string() }
fn default_rate_window() -> u64 { 60 }
fn default_rate_limit() -> usize { 5 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| QuillError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| QuillError::Config(e.to_string()))
    }

    /// The model used for branch summaries.
    pub fn summary_model(&self) -> &ModelConfig {
        self.summary_model.as_ref().unwrap_or(&self.model)
    }

    /// Clamp a requested query count into the configured bounds.
    pub fn clamp_query_count(&self, requested: usize) -> usize {
        requested.clamp(self.pipeline.min_queries, self.pipeline.max_queries)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
