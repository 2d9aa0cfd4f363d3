use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use quill_core::config::SearchConfig;
use quill_core::error::{QuillError, Result};
use quill_core::traits::SearchProvider;
use quill_core::types::SearchHit;

const TAVILY_API_URL: &str = "https://api.tavily.com/search";

/// Tavily web-search client.
pub struct TavilySearch {
    config: SearchConfig,
    http: reqwest::Client,
}

impl TavilySearch {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    exclude_domains: Vec<String>,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl SearchProvider for TavilySearch {
    fn search(&self, query: &str) -> BoxFuture<'_, Result<Vec<SearchHit>>> {
        let query = query.to_string();

        Box::pin(async move {
            let body = TavilyRequest {
                api_key: &self.config.api_key,
                query: &query,
                search_depth: &self.config.search_depth,
                max_results: self.config.max_results,
                exclude_domains: self.config.exclude_domains.clone(),
            };

            let response = self
                .http
                .post(TAVILY_API_URL)
                .json(&body)
                .send()
                .await
                .map_err(|e| QuillError::Search(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                return Err(QuillError::Search(format!("HTTP {}", status)));
            }

            let parsed: TavilyResponse = response
                .json()
                .await
                .map_err(|e| QuillError::Search(e.to_string()))?;

            Ok(parsed
                .results
                .into_iter()
                .map(|r| SearchHit {
                    url: r.url,
                    content: r.content,
                })
                .collect())
        })
    }
}
