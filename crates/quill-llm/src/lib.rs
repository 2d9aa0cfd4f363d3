pub mod providers;
pub mod retry;
pub mod search;
pub mod streaming;

use quill_core::config::{ModelConfig, SearchConfig};
use quill_core::traits::{ChatModel, SearchProvider};

pub use providers::{GeminiModel, OpenAiModel};
pub use retry::RetryingModel;
pub use search::TavilySearch;

/// Create a chat model based on the provider name. When the config carries a
/// retry section the client is wrapped in a [`RetryingModel`].
pub fn create_chat_model(config: &ModelConfig) -> Box<dyn ChatModel> {
    let inner: Box<dyn ChatModel> = match config.provider.as_str() {
        "gemini" | "google" => Box::new(GeminiModel::new()),
        // Everything else uses the OpenAI-compatible client
        _ => Box::new(OpenAiModel::new()),
    };

    match &config.retry {
        Some(retry) => Box::new(RetryingModel::new(inner, retry.clone())),
        None => inner,
    }
}

/// Create a search provider. Tavily is the only wire protocol spoken today;
/// unknown provider names fall back to it.
pub fn create_search_provider(config: &SearchConfig) -> Box<dyn SearchProvider> {
    Box::new(TavilySearch::new(config.clone()))
}
