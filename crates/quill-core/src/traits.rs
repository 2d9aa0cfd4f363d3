use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::{ChatMessage, SearchHit, StreamDelta};

/// Chat-completion capability — provider-agnostic streaming.
pub trait ChatModel: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;

    /// Buffered variant: drain the stream and return the full text.
    fn complete(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<String>> {
        let config = config.clone();
        Box::pin(async move {
            let mut stream = self.chat_stream(&config, messages).await?;
            let mut text = String::new();
            while let Some(delta) = stream.next().await {
                if let StreamDelta::TextDelta(chunk) = delta? {
                    text.push_str(&chunk);
                }
            }
            Ok(text)
        })
    }
}

/// Web-search capability. Results arrive in provider relevance order.
pub trait SearchProvider: Send + Sync + 'static {
    fn search(&self, query: &str) -> BoxFuture<'_, Result<Vec<SearchHit>>>;
}
