#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! Pipeflow: an ordered list of stages (fittings), each routed across a
//! partitioned, consistent-hashed cluster, with synchronous back-pressured
//! enqueue and per-stage end-of-input coordination (spec.md §1-§2).
//!
//! The client-facing surface (spec.md §6) is the small set of free functions
//! in this crate root, built from the lower-level crates in `crates/`:
//! [`exec`] builds a pipeline, [`queue_work`] feeds it, [`eoi`] closes it,
//! and [`receive_result`]/[`collect_results`]/[`status`] observe it.

use std::sync::Arc;

mod cluster;

pub use cluster::Cluster;

pub use pipeflow_behavior::{BehaviorFactory, BehaviorRegistry, Error as BehaviorError, FittingBehavior, Verdict};
pub use pipeflow_behaviors::{Pass, PassFactory, Reduce, ReduceFactory, Tee, TeeFactory, Transform, TransformFactory};
pub use pipeflow_builder::{eoi, status, Error as BuilderError, PipelineHandle};
pub use pipeflow_config::{build_spec, Error as ConfigError, FittingSpecConfig, PipelineOptions, SinkOption};
pub use pipeflow_context::{Context, LogMode, TraceFilter, Value as ContextValue};
pub use pipeflow_proto::{EnqueueOutcome, FittingSpec, NextStage, Partitioner, PipelineRef, WorkerStatus};
pub use pipeflow_sink::ReceivedRecord;

/// Builds a pipeline from an ordered list of already-validated fitting specs
/// and pipeline options (spec.md §6 `exec`). Specs are built with
/// [`build_spec`], which runs both the structural checks and the behavior's
/// `validate_arg` before a pipeline is ever spawned.
pub fn exec<Msg: 'static + Clone + Send>(
    stages: Vec<Arc<FittingSpec<Msg>>>,
    options: PipelineOptions<Msg>,
) -> Result<PipelineHandle<Msg>, BuilderError> {
    pipeflow_builder::build_pipeline(stages, options)
}

/// Feeds one input into a pipeline's first stage, blocking on back-pressure
/// until the downstream queue accepts or rejects it (spec.md §6 `queue_work`).
pub async fn queue_work<Msg: 'static + Clone + Send>(cluster: &Cluster<Msg>, handle: &PipelineHandle<Msg>, value: Msg) -> EnqueueOutcome {
    pipeflow_router::queue_work(cluster.ring(), cluster.directory(), &handle.head, value, None).await
}

/// Blocking receive of the next result, log, or end-of-input record for this
/// pipeline (spec.md §6 `receive_result`). Only meaningful when `exec` was
/// called with the default `sink: undefined` option, which makes the caller
/// the pipeline's sink; returns `None` otherwise or once the channel closes.
pub async fn receive_result<Msg: 'static + Clone + Send>(handle: &PipelineHandle<Msg>) -> Option<ReceivedRecord<Msg>> {
    handle.sink_receiver.as_ref()?.receive_result(handle.pipeline_ref).await
}

/// Drains `receive_result` until end-of-input, collecting results and logs
/// in arrival order (spec.md §6 `collect_results`).
pub async fn collect_results<Msg: 'static + Clone + Send>(handle: &PipelineHandle<Msg>) -> (Vec<(Msg, Arc<str>)>, Vec<(String, Arc<str>)>) {
    match &handle.sink_receiver {
        Some(receiver) => receiver.collect_results(handle.pipeline_ref).await,
        None => (Vec::new(), Vec::new()),
    }
}
