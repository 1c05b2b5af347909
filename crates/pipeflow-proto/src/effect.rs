//! The handler a worker gives a fitting's `process` callback to act on the
//! pipeline it's connected to (spec.md §4.2's "Emission").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pipeflow_context::{LogMode, TraceFilter};

use crate::records::{LogKind, WorkerStatus};
use crate::{PartitionId, PipelineRef, SinkHandle};

/// Errors that can occur while a worker emits an output.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum RouterError {
    /// The downstream queue rejected the output, including an empty preflist
    /// at routing time (spec.md §7's `preflist_exhausted`).
    #[error("output rejected by next stage (reason: {reason:?})")]
    Rejected {
        /// Why the downstream queue rejected it.
        reason: crate::records::RejectReason,
    },
}

/// Sends a worker's output to the next stage, blocking until the downstream
/// enqueue resolves (spec.md §4.2). Implemented by `pipeflow-router`.
#[async_trait]
pub trait OutputSink<Msg: 'static + Clone + Send>: Send + Sync {
    /// Routes `value`, produced by `from_partition`, to the next stage.
    async fn send_output(&self, from_partition: PartitionId, value: Msg) -> Result<(), RouterError>;

    /// Returns a best-effort status snapshot for this fitting's workers,
    /// used by the `status` client API (spec.md §6).
    async fn status(&self) -> Vec<WorkerStatus> {
        vec![]
    }
}

/// Handler used by a fitting's `process`/`done` callbacks to emit outputs
/// and log/trace records.
///
/// The inner enum is private so new variants can be added without breaking
/// callers, the same opacity trick `beaubourg`'s `EffectHandler` uses.
#[derive(Clone)]
pub struct EffectHandler<Msg: 'static + Clone + Send> {
    inner: Inner<Msg>,
}

#[derive(Clone)]
struct Inner<Msg: 'static + Clone + Send> {
    pipeline_ref: PipelineRef,
    fitting_name: Arc<str>,
    node_id: Arc<str>,
    partition: PartitionId,
    output: Arc<dyn OutputSink<Msg>>,
    sink: SinkHandle<Msg>,
    log_mode: LogMode,
    trace_filter: TraceFilter,
}

impl<Msg: 'static + Clone + Send> EffectHandler<Msg> {
    /// Creates a new effect handler for one worker's `process` call.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pipeline_ref: PipelineRef,
        fitting_name: Arc<str>,
        node_id: Arc<str>,
        partition: PartitionId,
        output: Arc<dyn OutputSink<Msg>>,
        sink: SinkHandle<Msg>,
        log_mode: LogMode,
        trace_filter: TraceFilter,
    ) -> Self {
        Self {
            inner: Inner {
                pipeline_ref,
                fitting_name,
                node_id,
                partition,
                output,
                sink,
                log_mode,
                trace_filter,
            },
        }
    }

    /// Emits an output to the next stage. Blocks until the downstream
    /// enqueue accepts or rejects it; a rejection is logged and swallowed,
    /// matching spec.md §4.2 ("A rejected output is discarded with a log
    /// record").
    pub async fn send_output(&self, value: Msg) {
        if let Err(error) = self.inner.output.send_output(self.inner.partition, value).await {
            self.log(LogKind::RejectedOutput, error.to_string(), HashMap::new()).await;
        }
    }

    /// Emits a log record of `kind`, routed to this pipeline's configured
    /// log destination (spec.md §6's `log` option). Some kinds are always
    /// surfaced regardless of destination preference turning logs off for a
    /// *fitting*; `LogMode::Drop` is the one mode that genuinely discards
    /// them, matching the client's explicit choice.
    pub async fn log(&self, kind: LogKind, reason: impl Into<String>, context: HashMap<String, String>) {
        let reason = reason.into();
        tracing::warn!(
            pipeline_ref = %self.inner.pipeline_ref,
            fitting = %self.inner.fitting_name,
            partition = ?self.inner.partition,
            ?kind,
            %reason,
            "fitting log record"
        );

        if self.inner.log_mode != LogMode::Drop {
            self.inner
                .sink
                .log(self.inner.pipeline_ref, self.inner.fitting_name.clone(), kind, reason, context)
                .await;
        }
    }

    /// Emits a trace record if `topics`, plus the fitting name, node id, and
    /// behavior identifier auto-included per spec.md §6, match the
    /// pipeline's trace filter.
    pub async fn trace(&self, topics: &[&str], msg: impl Into<String>) {
        let mut all_topics: Vec<String> = vec![self.inner.fitting_name.to_string(), self.inner.node_id.to_string()];
        all_topics.extend(topics.iter().map(|t| t.to_string()));

        let admitted = {
            let refs: Vec<&str> = all_topics.iter().map(String::as_str).collect();
            self.inner.trace_filter.admits(&refs)
        };

        if admitted {
            let msg = msg.into();
            tracing::trace!(
                pipeline_ref = %self.inner.pipeline_ref,
                fitting = %self.inner.fitting_name,
                "{}", msg
            );
            self.inner
                .sink
                .trace(self.inner.pipeline_ref, self.inner.fitting_name.clone(), all_topics, msg)
                .await;
        }
    }

    /// The partition this handler's worker serves.
    pub fn partition(&self) -> PartitionId {
        self.inner.partition
    }
}
