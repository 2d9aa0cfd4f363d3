use std::io::Write;

use quill_core::config::AppConfig;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[model]
provider = "openai"
model_id = "llama-3.3-70b-versatile"
api_key = "gsk-test-key"
base_url = "https://api.groq.com/openai/v1/chat/completions"
max_tokens = 2048
temperature = 0.2

[model.retry]
max_retries = 2
initial_backoff_ms = 500

[summary_model]
provider = "gemini"
model_id = "gemini-2.0-flash"
api_key = "ai-test-key"

[search]
api_key = "tvly-test"
search_depth = "advanced"
exclude_domains = ["pinterest.com"]
max_results = 3

[pipeline]
min_queries = 2
max_queries = 4
channel_capacity = 32

[gateway]
bind = "0.0.0.0:9999"
api_key = "qk_ci_key"
rate_limit_window_secs = 30
rate_limit_max_requests = 10
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.model.model_id, "llama-3.3-70b-versatile");
    assert_eq!(config.model.api_key, Some("gsk-test-key".to_string()));
    assert_eq!(config.model.max_tokens, 2048);
    let retry = config.model.retry.as_ref().expect("retry present");
    assert_eq!(retry.max_retries, 2);
    assert_eq!(retry.initial_backoff_ms, 500);
    assert_eq!(retry.max_backoff_ms, 30000); // default

    assert_eq!(config.summary_model().provider, "gemini");
    assert_eq!(config.summary_model().model_id, "gemini-2.0-flash");

    assert_eq!(config.search.search_depth, "advanced");
    assert_eq!(config.search.exclude_domains, vec!["pinterest.com"]);
    assert_eq!(config.search.max_results, 3);

    assert_eq!(config.pipeline.max_queries, 4);
    assert_eq!(config.pipeline.channel_capacity, 32);

    let gw = config.gateway.expect("gateway present");
    assert_eq!(gw.bind, "0.0.0.0:9999");
    assert_eq!(gw.api_key, Some("qk_ci_key".to_string()));
    assert_eq!(gw.rate_limit_window_secs, 30);
    assert_eq!(gw.rate_limit_max_requests, 10);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("QUILL_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
model_id = "gpt-4o-mini"
api_key = "${QUILL_TEST_API_KEY}"

[search]
api_key = "${QUILL_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));
    assert_eq!(config.search.api_key, "expanded-key-value");

    std::env::remove_var("QUILL_TEST_API_KEY");
}

#[test]
fn test_missing_config_file_is_a_clean_error() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/quill.toml")).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_minimal_config_gets_defaults() {
    let toml_content = r#"
[model]
model_id = "gpt-4o-mini"

[search]
api_key = "tvly-test"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.pipeline.min_queries, 2);
    assert_eq!(config.pipeline.max_queries, 5);
    assert!(config.gateway.is_none());
    // Summary model falls back to the primary model.
    assert_eq!(config.summary_model().model_id, "gpt-4o-mini");
}
