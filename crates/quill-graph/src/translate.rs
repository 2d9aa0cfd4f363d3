//! Trace-event to domain-event translation.
//!
//! A pure mapping: the translator holds only the run id it stamps onto the
//! terminal `end` event. Node lifecycle noise — `NodeEnd`, `BranchEnd`,
//! tokens from non-streaming nodes — is filtered out so consumers see one
//! progress event per node start, report tokens, and exactly one terminal
//! event.

use quill_core::error::GENERIC_FAILURE_MESSAGE;
use quill_core::{ResearchEvent, RunId};

use crate::node::NodeKind;
use crate::trace::{RunOutcome, TraceEvent};

/// Consumer-facing label for each pipeline step.
pub fn stage_label(node: NodeKind) -> &'static str {
    match node {
        NodeKind::SafetyCheck => "Checking topic safety",
        NodeKind::GenerateQueries => "Generating search queries",
        NodeKind::SearchWeb => "Searching the web",
        NodeKind::Summarize => "Summarizing findings",
        NodeKind::WriteReport => "Writing report",
    }
}

#[derive(Debug, Clone)]
pub struct EventTranslator {
    run_id: RunId,
}

impl EventTranslator {
    pub fn new(run_id: RunId) -> Self {
        Self { run_id }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Map one trace event to at most one domain event.
    pub fn translate(&self, event: &TraceEvent) -> Option<ResearchEvent> {
        match event {
            TraceEvent::NodeStart { node } => Some(ResearchEvent::Progress {
                content: stage_label(*node).to_string(),
            }),
            // Only the report writer streams to the consumer.
            TraceEvent::NodeToken {
                node: NodeKind::WriteReport,
                text,
            } => Some(ResearchEvent::Stream {
                content: text.clone(),
            }),
            TraceEvent::NodeToken { .. } => None,
            // Per-node and per-branch completions are internal bookkeeping;
            // surfacing them would report completion once per branch.
            TraceEvent::NodeEnd { .. } | TraceEvent::BranchEnd { .. } => None,
            TraceEvent::RunEnd {
                outcome: RunOutcome::Complete { queries },
            } => Some(ResearchEvent::End {
                queries: queries.clone(),
                run_id: self.run_id.clone(),
            }),
            TraceEvent::RunEnd {
                outcome: RunOutcome::Unsafe { category },
            } => Some(ResearchEvent::Error {
                content: format!("Topic is flagged as unsafe: {category}"),
            }),
            TraceEvent::RunFailed { domain_message } => Some(ResearchEvent::Error {
                content: domain_message
                    .clone()
                    .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
            }),
        }
    }
}
