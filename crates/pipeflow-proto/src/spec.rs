//! The immutable fitting spec and the details derived from it at pipeline
//! build time (spec.md §3).

use std::sync::Arc;

use crate::handles::{CoordinatorHandle, SinkHandle};
use crate::{HashValue, PipelineRef};
use pipeflow_context::{LogMode, TraceFilter};

/// Either a deterministic hash function, or the `follow` sentinel meaning
/// "route to the partition that produced this input" (spec.md §3).
#[derive(Clone)]
pub enum Partitioner<Msg> {
    /// Hash the input deterministically.
    Hash(Arc<dyn Fn(&Msg) -> HashValue + Send + Sync>),
    /// Keep the producing partition.
    Follow,
}

impl<Msg> std::fmt::Debug for Partitioner<Msg> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Partitioner::Hash(_) => f.write_str("Partitioner::Hash(..)"),
            Partitioner::Follow => f.write_str("Partitioner::Follow"),
        }
    }
}

/// An immutable fitting spec, unchanged for the lifetime of the pipeline
/// (spec.md §3).
pub struct FittingSpec<Msg> {
    /// Human label attached to every result/log this fitting emits.
    pub name: Arc<str>,
    /// The identifier of the registered behavior implementing this fitting.
    pub behavior_id: String,
    /// Opaque static configuration passed to the behavior's `init`.
    pub arg: serde_yaml::Value,
    /// How inputs are routed to a partition.
    pub partitioner: Partitioner<Msg>,
    /// Length of the preflist considered for each input.
    pub nval: usize,
    /// Maximum enqueued + blocking items per worker, before the node-wide
    /// ceiling is applied.
    pub q_limit: usize,
}

/// What follows a fitting: another fitting, or the pipeline sink.
#[derive(Clone)]
pub enum NextStage<Msg> {
    /// The next fitting in the pipeline.
    Stage(Arc<FittingDetails<Msg>>),
    /// The pipeline's sink; this is the last fitting.
    Sink,
}

/// A fitting spec plus the coordinator address and pipeline reference,
/// sent to a worker once on startup (spec.md §3).
pub struct FittingDetails<Msg> {
    /// The pipeline this fitting belongs to.
    pub pipeline_ref: PipelineRef,
    /// The immutable spec.
    pub spec: Arc<FittingSpec<Msg>>,
    /// This fitting's coordinator.
    pub coordinator: CoordinatorHandle<Msg>,
    /// What follows this fitting.
    pub next: NextStage<Msg>,
    /// Where result/log/eoi records for this pipeline go.
    pub sink: SinkHandle<Msg>,
    /// Where log records for this pipeline are delivered.
    pub log_mode: LogMode,
    /// Which trace topics are kept for this pipeline.
    pub trace_filter: TraceFilter,
}
