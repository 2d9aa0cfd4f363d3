use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::warn;

use quill_core::config::{ModelConfig, RetryConfig};
use quill_core::error::{QuillError, Result};
use quill_core::traits::ChatModel;
use quill_core::types::{ChatMessage, StreamDelta};

/// A chat model that retries failed requests with exponential backoff.
///
/// Pipeline nodes are single-shot by contract; all retry policy lives here,
/// in the capability collaborator.
pub struct RetryingModel {
    inner: Box<dyn ChatModel>,
    retry_config: RetryConfig,
}

impl RetryingModel {
    pub fn new(inner: Box<dyn ChatModel>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }
}

fn is_retryable(e: &QuillError) -> bool {
    match e {
        QuillError::LlmRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        QuillError::LlmStream(_) => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = (config.initial_backoff_ms * 2u64.pow(attempt)).min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl ChatModel for RetryingModel {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;
            let mut last_err = None;

            for attempt in 0..=max_retries {
                match self.inner.chat_stream(&config, messages.clone()).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => {
                        if is_retryable(&e) && attempt < max_retries {
                            let backoff = calculate_backoff(attempt, &self.retry_config);
                            warn!(
                                attempt = attempt + 1,
                                max_retries,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Retrying LLM request"
                            );
                            tokio::time::sleep(backoff).await;
                            last_err = Some(e);
                            continue;
                        }
                        return Err(e);
                    }
                }
            }

            Err(last_err.unwrap_or_else(|| QuillError::LlmRequest("requests exhausted".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_retryable() {
        assert!(is_retryable(&QuillError::LlmRequest("HTTP 429: slow down".into())));
        assert!(is_retryable(&QuillError::LlmRequest("HTTP 503: overloaded".into())));
        assert!(is_retryable(&QuillError::LlmStream("reset".into())));
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!is_retryable(&QuillError::LlmRequest("HTTP 401: bad key".into())));
        assert!(!is_retryable(&QuillError::LlmParse("bad json".into())));
    }

    #[test]
    fn backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 4000,
        };
        let d = calculate_backoff(8, &config);
        // cap 4000ms, jitter up to 1.2x
        assert!(d <= Duration::from_millis(4800));
    }
}
