//! Internal trace events emitted by the executor.
//!
//! These are the raw telemetry of a run. Consumers never see them directly;
//! [`crate::translate::EventTranslator`] maps them to the public
//! [`quill_core::ResearchEvent`] stream.

use crate::node::NodeKind;

/// What a completed run resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The pipeline ran to the end and produced a report.
    Complete { queries: Vec<String> },
    /// The safety gate rejected the topic. This is a completed run, not a
    /// failure.
    Unsafe { category: String },
}

/// One step of executor telemetry.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// A node began executing.
    NodeStart { node: NodeKind },
    /// A streamed text fragment from a node's model call.
    NodeToken { node: NodeKind, text: String },
    /// A node finished successfully.
    NodeEnd { node: NodeKind },
    /// A research branch finished, successfully or not.
    BranchEnd { branch: usize },
    /// The run completed. Emitted exactly once per completed run.
    RunEnd { outcome: RunOutcome },
    /// The run failed. Emitted exactly once per failed run; carries the
    /// user-safe message when the failure has one.
    RunFailed { domain_message: Option<String> },
}
