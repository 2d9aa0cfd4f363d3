//! Pipeline state and the updates nodes may propose.
//!
//! Nodes never mutate state in place. Each node returns a [`StateUpdate`]
//! describing the keys it owns, and the executor applies it from a single
//! task. Branch subgraphs carry their own [`BranchState`], isolated from the
//! run state until the executor merges their summaries at the barrier.

use quill_core::{QuillError, Result};

/// Top-level state for one research run.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// The user's research topic, set once at submission and never rewritten.
    pub topic: String,
    /// Requested number of parallel research branches, already clamped to the
    /// configured bounds.
    pub query_count: usize,
    /// Verdict of the safety gate. Routing after the gate reads this field.
    pub is_safe: bool,
    /// Populated only when `is_safe` is false.
    pub violated_category: Option<String>,
    /// Generated search queries, in submission order.
    pub queries: Vec<String>,
    /// One summary per surviving branch, ordered by branch index.
    pub summaries: Vec<String>,
    /// The final markdown report.
    pub report: String,
}

impl RunState {
    pub fn new(topic: String, query_count: usize) -> Self {
        Self {
            topic,
            query_count,
            ..Self::default()
        }
    }

    /// Apply an update produced by a run-level node.
    ///
    /// Branch-owned updates (`SearchDocs`) are rejected: they belong to a
    /// [`BranchState`] and reaching here means a wiring bug, not bad input.
    pub fn apply(&mut self, update: StateUpdate) -> Result<()> {
        match update {
            StateUpdate::Safety {
                is_safe,
                violated_category,
            } => {
                self.is_safe = is_safe;
                self.violated_category = violated_category;
            }
            StateUpdate::Queries(queries) => self.queries = queries,
            StateUpdate::Summaries(mut summaries) => self.summaries.append(&mut summaries),
            StateUpdate::Report(report) => self.report = report,
            StateUpdate::SearchDocs(_) => {
                return Err(QuillError::StateMerge(
                    "search documents cannot be merged into run state".to_string(),
                ))
            }
        }
        Ok(())
    }
}

/// State local to one search-and-summarize branch.
#[derive(Debug, Clone, Default)]
pub struct BranchState {
    /// The single query this branch researches.
    pub query: String,
    /// Formatted search results, input to the summarizer.
    pub search_docs: Vec<String>,
    /// Summaries produced by this branch. Merged upward at the barrier.
    pub summaries: Vec<String>,
}

impl BranchState {
    pub fn new(query: String) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    /// Apply an update produced by a branch node.
    pub fn apply(&mut self, update: StateUpdate) -> Result<()> {
        match update {
            StateUpdate::SearchDocs(docs) => self.search_docs = docs,
            StateUpdate::Summaries(mut summaries) => self.summaries.append(&mut summaries),
            other => {
                return Err(QuillError::StateMerge(format!(
                    "update {} cannot be merged into branch state",
                    other.key()
                )))
            }
        }
        Ok(())
    }
}

/// A single node's proposed write, keyed by the state field it owns.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    /// Safety gate verdict.
    Safety {
        is_safe: bool,
        violated_category: Option<String>,
    },
    /// Generated search queries.
    Queries(Vec<String>),
    /// Formatted search results (branch-local).
    SearchDocs(Vec<String>),
    /// Research summaries. Appends rather than overwrites, so branch
    /// contributions accumulate.
    Summaries(Vec<String>),
    /// The final report.
    Report(String),
}

impl StateUpdate {
    pub fn key(&self) -> &'static str {
        match self {
            StateUpdate::Safety { .. } => "safety",
            StateUpdate::Queries(_) => "queries",
            StateUpdate::SearchDocs(_) => "search_docs",
            StateUpdate::Summaries(_) => "summaries",
            StateUpdate::Report(_) => "report",
        }
    }
}
