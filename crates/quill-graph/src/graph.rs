//! The public face of the pipeline: a wired graph with two entry points.
//!
//! `run` is the buffered variant — it drives the run to completion and
//! returns only the report. `stream` spawns the run on its own task and
//! returns the translated domain-event sequence; dropping the stream
//! cancels the run cooperatively.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use quill_core::config::PipelineConfig;
use quill_core::{
    AppConfig, ChatModel, QuillError, ResearchEvent, Result, RunId, SearchProvider,
};

use crate::executor::{Completion, Emitter};
use crate::node::{
    QueryGeneratorNode, ReportWriterNode, SafetyCheckNode, SummaryNode, WebSearchNode,
};
use crate::trace::TraceEvent;
use crate::translate::EventTranslator;

#[derive(Clone)]
pub struct ResearchGraph {
    pub(crate) safety: SafetyCheckNode,
    pub(crate) generate: QueryGeneratorNode,
    pub(crate) search: WebSearchNode,
    pub(crate) summarize: SummaryNode,
    pub(crate) writer: ReportWriterNode,
    pipeline: PipelineConfig,
}

impl ResearchGraph {
    /// Wire the graph from config and concrete capabilities. The primary
    /// model handles the safety check, query generation, and the report;
    /// branch summaries go to the (possibly cheaper) summary model.
    pub fn new(
        config: &AppConfig,
        chat: Arc<dyn ChatModel>,
        summary_chat: Arc<dyn ChatModel>,
        search: Arc<dyn SearchProvider>,
    ) -> Self {
        Self {
            safety: SafetyCheckNode::new(chat.clone(), config.model.clone()),
            generate: QueryGeneratorNode::new(chat.clone(), config.model.clone()),
            search: WebSearchNode::new(search),
            summarize: SummaryNode::new(summary_chat, config.summary_model().clone()),
            writer: ReportWriterNode::new(chat, config.model.clone()),
            pipeline: config.pipeline.clone(),
        }
    }

    fn clamp(&self, requested: usize) -> usize {
        let clamped = requested.clamp(self.pipeline.min_queries, self.pipeline.max_queries);
        if clamped != requested {
            warn!(requested, clamped, "query count outside configured bounds");
        }
        clamped
    }

    /// Buffered run: returns the final report, or the first error.
    ///
    /// An unsafe topic surfaces as [`QuillError::UnsafeTopic`] here; only
    /// the streaming entry point reports it as a terminal event.
    pub async fn run(&self, topic: &str, query_count: usize) -> Result<String> {
        let emitter = Emitter::new(None, CancellationToken::new());
        let query_count = self.clamp(query_count);
        match self.execute(topic.to_string(), query_count, &emitter).await? {
            Completion::Report { report, .. } => Ok(report),
            Completion::Unsafe { category } => Err(QuillError::UnsafeTopic { category }),
        }
    }

    /// Streaming run with a caller-chosen run id.
    ///
    /// The run executes on a spawned task; the returned stream yields the
    /// translated domain events and terminates with exactly one `end` or
    /// `error` event. Dropping the stream cancels the run.
    pub fn stream_with_id(
        &self,
        topic: &str,
        query_count: usize,
        run_id: RunId,
    ) -> impl Stream<Item = ResearchEvent> + Send + 'static {
        let (tx, rx) = mpsc::channel(self.pipeline.channel_capacity);
        let cancel = CancellationToken::new();
        let emitter = Emitter::new(Some(tx), cancel);

        let graph = self.clone();
        let topic = topic.to_string();
        let query_count = self.clamp(query_count);
        let task_run_id = run_id.clone();
        tokio::spawn(async move {
            info!(run_id = %task_run_id, topic = %topic, query_count, "research run started");
            match graph.execute(topic, query_count, &emitter).await {
                Ok(_) => debug!(run_id = %task_run_id, "research run finished"),
                Err(QuillError::Cancelled) => {
                    debug!(run_id = %task_run_id, "research run cancelled by consumer");
                }
                Err(e) => {
                    error!(run_id = %task_run_id, error = %e, "research run failed");
                    emitter
                        .emit(TraceEvent::RunFailed {
                            domain_message: e.domain_message().map(str::to_string),
                        })
                        .await;
                }
            }
        });

        let translator = EventTranslator::new(run_id);
        ReceiverStream::new(rx).filter_map(move |trace| translator.translate(&trace))
    }

    /// Streaming run with a fresh run id.
    pub fn stream(
        &self,
        topic: &str,
        query_count: usize,
    ) -> impl Stream<Item = ResearchEvent> + Send + 'static {
        self.stream_with_id(topic, query_count, RunId::new())
    }
}
