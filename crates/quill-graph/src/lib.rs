//! Quill's research pipeline engine.
//!
//! A run flows through a fixed graph: safety gate, query generation, a
//! dynamic fan-out of search-and-summarize branches, a barrier, and a
//! streamed report. [`ResearchGraph`] is the entry point; everything else
//! here is the machinery underneath it.

pub mod executor;
pub mod graph;
pub mod node;
pub mod prompts;
pub mod state;
pub mod trace;
pub mod translate;

pub use executor::{next_transition, BranchSpec, Stage, Transition};
pub use graph::ResearchGraph;
pub use node::NodeKind;
pub use state::{BranchState, RunState, StateUpdate};
pub use trace::{RunOutcome, TraceEvent};
pub use translate::{stage_label, EventTranslator};
