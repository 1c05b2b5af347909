//! Outcomes, sink records, and status snapshots exchanged between actors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::handles::QueueManagerHandle;
use crate::{PartitionId, PipelineRef};

/// The outcome of a synchronous enqueue attempt (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The input is now sitting in `ready`.
    Accepted,
    /// The input was rejected outright.
    Rejected(RejectReason),
}

/// Why an enqueue was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The queue has already been marked for end-of-input.
    EoiClosed,
    /// No fitting details could be resolved for this input.
    UnknownFitting,
    /// The preflist was empty at routing time (spec.md §7).
    PreflistExhausted,
}

/// The kind of a log record (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// The stage returned `error(reason)`.
    Result,
    /// The stage callback raised/panicked.
    Exception,
    /// An input was forwarded to the next preflist entry.
    ForwardPreflist,
    /// An input exhausted its preflist while being forwarded.
    ForwardPreflistExhausted,
    /// An input had an empty preflist at routing time.
    PreflistExhausted,
    /// A worker terminated with an uncatchable reason.
    UnreachableWorker,
    /// A worker restart attempt failed.
    WorkerRestartFailed,
    /// An output send to the next stage was rejected.
    RejectedOutput,
}

/// A structured log payload (spec.md §7): module/partition/details/input
/// context, collapsed here into a free-form string map the way
/// `beaubourg`'s `processor::Error::Processor` carries a `context` map.
pub type LogContext = HashMap<String, String>;

/// A record delivered to a pipeline's sink.
pub enum SinkRecord<Msg> {
    /// A successful output from a fitting.
    Result {
        /// The pipeline this belongs to.
        pipeline_ref: PipelineRef,
        /// The fitting that produced it.
        from_name: Arc<str>,
        /// The value.
        value: Msg,
    },
    /// A log record.
    Log {
        /// The pipeline this belongs to.
        pipeline_ref: PipelineRef,
        /// The fitting that produced it.
        from_name: Arc<str>,
        /// The kind of log record.
        kind: LogKind,
        /// A human-readable reason.
        reason: String,
        /// Structured context (partition, input description, ...).
        context: LogContext,
    },
    /// A trace record, emitted only when admitted by the pipeline's trace
    /// filter.
    Trace {
        /// The pipeline this belongs to.
        pipeline_ref: PipelineRef,
        /// The fitting that produced it.
        from_name: Arc<str>,
        /// The topics this record carries.
        topics: Vec<String>,
        /// A human-readable message.
        msg: String,
    },
    /// End-of-input for the whole pipeline.
    EndOfInput {
        /// The pipeline this belongs to.
        pipeline_ref: PipelineRef,
    },
}

/// The state of a per-fitting coordinator (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Accepting inputs, no end-of-input requested yet.
    Open,
    /// End-of-input requested, waiting for the active worker set to drain.
    Draining,
    /// End-of-input forwarded, the coordinator is about to exit.
    Closed,
}

/// A coordinator's reply to a status query: its state and the queue
/// managers it currently has active workers registered through.
pub struct CoordinatorStatus<Msg> {
    /// The coordinator's state.
    pub state: CoordinatorState,
    /// `(partition, queue manager)` pairs currently registered in `W`.
    pub active: Vec<(PartitionId, QueueManagerHandle<Msg>)>,
}

/// The state of a single worker (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// `init` has not returned yet.
    Init,
    /// Idle, waiting for the next input.
    Waiting,
    /// Inside a `process` call.
    Processing,
    /// `done` has returned; the worker is exiting.
    Done,
}

/// A best-effort status snapshot for a single worker (spec.md §6).
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    /// The node hosting this worker.
    pub node_id: String,
    /// The partition this worker serves.
    pub partition: PartitionId,
    /// The fitting this worker serves.
    pub fitting_name: Arc<str>,
    /// The registered behavior identifier.
    pub behavior_id: String,
    /// The worker's current state.
    pub state: WorkerState,
    /// Whether end-of-input has been received for this queue.
    pub inputs_done: bool,
    /// Items currently in `ready`.
    pub queue_length: usize,
    /// Senders currently parked in `blocking`.
    pub blocking_length: usize,
    /// When the worker was started.
    pub started: Instant,
    /// Inputs successfully processed so far.
    pub processed: u64,
    /// `error(reason)` verdicts returned so far.
    pub failures: u64,
    /// Cumulative time spent inside `process`, in microseconds.
    pub work_time_us: u64,
    /// Cumulative time spent waiting for input, in microseconds.
    pub idle_time_us: u64,
}
