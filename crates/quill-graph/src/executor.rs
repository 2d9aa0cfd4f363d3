//! The run loop: routing table, trace emission, fan-out barrier.
//!
//! Routing is a pure function over `(stage, state)`; all side effects —
//! node calls, state merges, trace emission — happen in the executor.
//! Branches run on their own tasks and report back through a `JoinSet`;
//! the executor is the only task that ever writes [`RunState`].

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use quill_core::{QuillError, Result, StreamDelta};

use crate::graph::ResearchGraph;
use crate::node::{self, NodeKind, SummaryNode, WebSearchNode};
use crate::state::{BranchState, RunState, StateUpdate};
use crate::trace::{RunOutcome, TraceEvent};

/// Pipeline stages, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    SafetyCheck,
    GenerateQueries,
    ConductResearch,
    WriteReport,
    End,
}

/// Where a stage hands off to.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Goto(Stage),
    /// Fork into one research branch per spec, then rejoin.
    FanOut(Vec<BranchSpec>),
    Halt,
}

/// One research branch: a query and its position in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchSpec {
    pub index: usize,
    pub query: String,
}

/// The routing table. Total over every stage, pure over the state.
pub fn next_transition(stage: Stage, state: &RunState) -> Transition {
    match stage {
        Stage::Start => Transition::Goto(Stage::SafetyCheck),
        Stage::SafetyCheck if state.is_safe => Transition::Goto(Stage::GenerateQueries),
        Stage::SafetyCheck => Transition::Goto(Stage::End),
        Stage::GenerateQueries => Transition::FanOut(
            state
                .queries
                .iter()
                .enumerate()
                .map(|(index, query)| BranchSpec {
                    index,
                    query: query.clone(),
                })
                .collect(),
        ),
        Stage::ConductResearch => Transition::Goto(Stage::WriteReport),
        Stage::WriteReport => Transition::Goto(Stage::End),
        Stage::End => Transition::Halt,
    }
}

/// Trace sink shared by the executor and its branch tasks.
///
/// `tx` is None for buffered runs — the executor runs identically, it just
/// has no audience. A failed send means the consumer dropped the stream, in
/// which case the run is cancelled cooperatively.
#[derive(Clone)]
pub(crate) struct Emitter {
    tx: Option<mpsc::Sender<TraceEvent>>,
    cancel: CancellationToken,
}

impl Emitter {
    pub(crate) fn new(tx: Option<mpsc::Sender<TraceEvent>>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    pub(crate) async fn emit(&self, event: TraceEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).await.is_err() {
                self.cancel.cancel();
            }
        }
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// What a successful `execute` resolved to.
pub(crate) enum Completion {
    Report { report: String, queries: Vec<String> },
    Unsafe { category: String },
}

impl ResearchGraph {
    /// Drive one run from `Start` to `Halt`.
    ///
    /// Emits the run's trace, including exactly one `RunEnd` on completion.
    /// On error no terminal event is emitted here; the streaming wrapper owns
    /// `RunFailed` so buffered runs never push events nobody reads.
    pub(crate) async fn execute(
        &self,
        topic: String,
        query_count: usize,
        emitter: &Emitter,
    ) -> Result<Completion> {
        let cancel = emitter.cancel_token().clone();
        let mut state = RunState::new(topic, query_count);
        let mut stage = Stage::Start;

        loop {
            if cancel.is_cancelled() {
                return Err(QuillError::Cancelled);
            }
            match next_transition(stage, &state) {
                Transition::Goto(next) => {
                    stage = next;
                    self.run_stage(stage, &mut state, emitter, &cancel).await?;
                }
                Transition::FanOut(branches) => {
                    stage = Stage::ConductResearch;
                    self.conduct_research(branches, &mut state, emitter, &cancel)
                        .await?;
                }
                Transition::Halt => break,
            }
        }

        if state.is_safe {
            emitter
                .emit(TraceEvent::RunEnd {
                    outcome: RunOutcome::Complete {
                        queries: state.queries.clone(),
                    },
                })
                .await;
            Ok(Completion::Report {
                report: state.report,
                queries: state.queries,
            })
        } else {
            let category = state
                .violated_category
                .unwrap_or_else(|| "Unspecified".to_string());
            info!(category = %category, "topic rejected by safety gate");
            emitter
                .emit(TraceEvent::RunEnd {
                    outcome: RunOutcome::Unsafe {
                        category: category.clone(),
                    },
                })
                .await;
            Ok(Completion::Unsafe { category })
        }
    }

    async fn run_stage(
        &self,
        stage: Stage,
        state: &mut RunState,
        emitter: &Emitter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(QuillError::Cancelled);
        }
        match stage {
            Stage::SafetyCheck => {
                emitter
                    .emit(TraceEvent::NodeStart {
                        node: NodeKind::SafetyCheck,
                    })
                    .await;
                let update = tokio::select! {
                    result = self.safety.run(state) => result?,
                    _ = cancel.cancelled() => return Err(QuillError::Cancelled),
                };
                state.apply(update)?;
                emitter
                    .emit(TraceEvent::NodeEnd {
                        node: NodeKind::SafetyCheck,
                    })
                    .await;
            }
            Stage::GenerateQueries => {
                emitter
                    .emit(TraceEvent::NodeStart {
                        node: NodeKind::GenerateQueries,
                    })
                    .await;
                let update = tokio::select! {
                    result = self.generate.run(state) => result?,
                    _ = cancel.cancelled() => return Err(QuillError::Cancelled),
                };
                state.apply(update)?;
                emitter
                    .emit(TraceEvent::NodeEnd {
                        node: NodeKind::GenerateQueries,
                    })
                    .await;
            }
            Stage::WriteReport => self.write_report(state, emitter, cancel).await?,
            // Fan-out stages are handled at the transition; Start and End do
            // no work of their own.
            Stage::Start | Stage::ConductResearch | Stage::End => {}
        }
        Ok(())
    }

    /// Fan out one task per branch and rejoin at the barrier.
    ///
    /// The barrier resolves once every branch has reported. Branch failures
    /// with a domain message degrade the run (survivors still feed the
    /// report); only when every branch fails does the run fail, with the
    /// first failure. Unclassified branch errors abort immediately.
    async fn conduct_research(
        &self,
        branches: Vec<BranchSpec>,
        state: &mut RunState,
        emitter: &Emitter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let total = branches.len();
        info!(branches = total, "dispatching research branches");

        let mut set = JoinSet::new();
        for spec in branches {
            let search = self.search.clone();
            let summarize = self.summarize.clone();
            let emitter = emitter.clone();
            let cancel = cancel.clone();
            set.spawn(async move { run_branch(spec, search, summarize, emitter, cancel).await });
        }

        let mut contributions: Vec<(usize, Vec<String>)> = Vec::with_capacity(total);
        let mut first_failure: Option<QuillError> = None;
        while let Some(joined) = set.join_next().await {
            let (index, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    set.abort_all();
                    return Err(QuillError::StateMerge(format!("branch task failed: {e}")));
                }
            };
            match result {
                Ok(summaries) => contributions.push((index, summaries)),
                Err(e) if e.domain_message().is_some() => {
                    warn!(branch = index, error = %e, "research branch failed");
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
                Err(e) => {
                    set.abort_all();
                    return Err(e);
                }
            }
        }

        if contributions.is_empty() {
            return Err(first_failure.unwrap_or(QuillError::Cancelled));
        }
        if let Some(e) = first_failure {
            debug!(
                survivors = contributions.len(),
                total, error = %e, "continuing with partial research"
            );
        }

        // Merge in submission order, not arrival order.
        contributions.sort_by_key(|(index, _)| *index);
        for (_, summaries) in contributions {
            state.apply(StateUpdate::Summaries(summaries))?;
        }
        Ok(())
    }

    async fn write_report(
        &self,
        state: &mut RunState,
        emitter: &Emitter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        emitter
            .emit(TraceEvent::NodeStart {
                node: NodeKind::WriteReport,
            })
            .await;
        let mut stream = tokio::select! {
            result = self.writer.open_stream(state) => result?,
            _ = cancel.cancelled() => return Err(QuillError::Cancelled),
        };

        let mut report = String::new();
        loop {
            let delta = tokio::select! {
                delta = stream.next() => match delta {
                    Some(delta) => delta,
                    None => break,
                },
                _ = cancel.cancelled() => return Err(QuillError::Cancelled),
            };
            match delta.map_err(|e| node::node_failure(NodeKind::WriteReport, &e))? {
                StreamDelta::TextDelta(text) => {
                    emitter
                        .emit(TraceEvent::NodeToken {
                            node: NodeKind::WriteReport,
                            text: text.clone(),
                        })
                        .await;
                    report.push_str(&text);
                }
                StreamDelta::Done => break,
                StreamDelta::Usage {
                    input_tokens,
                    output_tokens,
                } => {
                    debug!(input_tokens, output_tokens, "report token usage");
                }
            }
        }
        drop(stream);

        state.apply(StateUpdate::Report(report))?;
        emitter
            .emit(TraceEvent::NodeEnd {
                node: NodeKind::WriteReport,
            })
            .await;
        Ok(())
    }
}

/// One branch: search, then summarize, on a branch-local state.
///
/// `BranchEnd` is emitted whether the branch succeeded or not, so the trace
/// always accounts for every dispatched branch.
async fn run_branch(
    spec: BranchSpec,
    search: WebSearchNode,
    summarize: SummaryNode,
    emitter: Emitter,
    cancel: CancellationToken,
) -> (usize, Result<Vec<String>>) {
    let index = spec.index;
    let result = branch_inner(spec.query, &search, &summarize, &emitter, &cancel).await;
    emitter.emit(TraceEvent::BranchEnd { branch: index }).await;
    (index, result)
}

async fn branch_inner(
    query: String,
    search: &WebSearchNode,
    summarize: &SummaryNode,
    emitter: &Emitter,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    let mut state = BranchState::new(query);

    if cancel.is_cancelled() {
        return Err(QuillError::Cancelled);
    }
    emitter
        .emit(TraceEvent::NodeStart {
            node: NodeKind::SearchWeb,
        })
        .await;
    let update = tokio::select! {
        result = search.run(&state) => result?,
        _ = cancel.cancelled() => return Err(QuillError::Cancelled),
    };
    state.apply(update)?;
    emitter
        .emit(TraceEvent::NodeEnd {
            node: NodeKind::SearchWeb,
        })
        .await;

    if cancel.is_cancelled() {
        return Err(QuillError::Cancelled);
    }
    emitter
        .emit(TraceEvent::NodeStart {
            node: NodeKind::Summarize,
        })
        .await;
    let update = tokio::select! {
        result = summarize.run(&state) => result?,
        _ = cancel.cancelled() => return Err(QuillError::Cancelled),
    };
    state.apply(update)?;
    emitter
        .emit(TraceEvent::NodeEnd {
            node: NodeKind::Summarize,
        })
        .await;

    Ok(state.summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_is_total_and_linear_when_safe() {
        let mut state = RunState::new("topic".to_string(), 2);
        state.is_safe = true;
        state.queries = vec!["a".to_string(), "b".to_string()];

        assert_eq!(
            next_transition(Stage::Start, &state),
            Transition::Goto(Stage::SafetyCheck)
        );
        assert_eq!(
            next_transition(Stage::SafetyCheck, &state),
            Transition::Goto(Stage::GenerateQueries)
        );
        assert_eq!(
            next_transition(Stage::GenerateQueries, &state),
            Transition::FanOut(vec![
                BranchSpec {
                    index: 0,
                    query: "a".to_string()
                },
                BranchSpec {
                    index: 1,
                    query: "b".to_string()
                },
            ])
        );
        assert_eq!(
            next_transition(Stage::ConductResearch, &state),
            Transition::Goto(Stage::WriteReport)
        );
        assert_eq!(
            next_transition(Stage::WriteReport, &state),
            Transition::Goto(Stage::End)
        );
        assert_eq!(next_transition(Stage::End, &state), Transition::Halt);
    }

    #[test]
    fn unsafe_topic_short_circuits_to_end() {
        let mut state = RunState::new("topic".to_string(), 2);
        state.is_safe = false;
        assert_eq!(
            next_transition(Stage::SafetyCheck, &state),
            Transition::Goto(Stage::End)
        );
    }
}
