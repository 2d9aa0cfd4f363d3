use thiserror::Error;

/// Message shown to consumers when a failure has no user-safe message of its own.
pub const GENERIC_FAILURE_MESSAGE: &str = "Unable to complete research. Please try again.";

#[derive(Debug, Error)]
pub enum QuillError {
    // Capability errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    #[error("search request failed: {0}")]
    Search(String),

    // Pipeline errors
    /// A node's external capability call failed. `message` is user-safe and
    /// may be surfaced to the consumer verbatim.
    #[error("{message}")]
    Node { node: &'static str, message: String },

    /// The topic was rejected by the safety gate. A terminal outcome, not a
    /// failure — only the buffered entry point reports it as an error.
    #[error("topic is flagged as unsafe: {category}")]
    UnsafeTopic { category: String },

    /// A node returned a state update its state shape does not own.
    #[error("state merge violation: {0}")]
    StateMerge(String),

    #[error("run cancelled")]
    Cancelled,

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QuillError {
    /// The user-safe message for domain errors, `None` for everything else.
    /// Unclassified errors must never leak detail to consumers; callers fall
    /// back to [`GENERIC_FAILURE_MESSAGE`].
    pub fn domain_message(&self) -> Option<&str> {
        match self {
            QuillError::Node { message, .. } => Some(message),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, QuillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_errors_expose_their_safe_message() {
        let err = QuillError::Node {
            node: "generate_queries",
            message: "Unable to generate queries. Please try again.".into(),
        };
        assert_eq!(
            err.domain_message(),
            Some("Unable to generate queries. Please try again.")
        );
        assert_eq!(err.to_string(), "Unable to generate queries. Please try again.");
    }

    #[test]
    fn unclassified_errors_have_no_consumer_message() {
        assert!(QuillError::LlmRequest("HTTP 500".into()).domain_message().is_none());
        assert!(QuillError::StateMerge("report into branch".into())
            .domain_message()
            .is_none());
        assert!(QuillError::Cancelled.domain_message().is_none());
    }
}
