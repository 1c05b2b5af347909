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

//! Builds a pipeline from an ordered list of fitting specs (spec.md §4.4):
//! spawns coordinators right-to-left, links them to a supervising process,
//! and returns the pipeline handle the client API operates on.

use std::sync::Arc;

use pipeflow_config::{PipelineOptions, SinkOption};
use pipeflow_coordinator::spawn_coordinator;
use pipeflow_proto::{FittingSpec, NextStage, PipelineRef, SinkHandle, WorkerStatus};
use pipeflow_sink::SinkReceiver;
use pipeflow_task::labels::NodeLabels;
use pipeflow_task::TaskManager;

pub use pipeflow_proto::FittingDetails;

/// Errors building a pipeline.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// `exec` was called with no fittings.
    #[error("cannot build a pipeline with no fittings")]
    EmptyPipeline,
}

/// The opaque value a client holds for a running pipeline (spec.md §3): a
/// unique pipeline reference, the ordered stage coordinators, and the sink.
pub struct PipelineHandle<Msg: 'static + Clone + Send> {
    /// This pipeline's unique reference, attached to every sink-bound record.
    pub pipeline_ref: PipelineRef,
    /// The first stage's details; `queue_work` routes through its coordinator.
    pub head: Arc<FittingDetails<Msg>>,
    /// Every stage's details, head to tail, for status queries.
    pub stages: Vec<Arc<FittingDetails<Msg>>>,
    /// Where this pipeline's result/log/end-of-input records are delivered.
    pub sink: SinkHandle<Msg>,
    /// The receiving end of a freshly opened sink channel, present only when
    /// `exec`'s `sink` option was left `undefined` (spec.md §6: default is
    /// the caller).
    pub sink_receiver: Option<SinkReceiver<Msg>>,
    /// The supervising process for this pipeline's coordinators (spec.md
    /// §4.4 step 4, §5 cancellation).
    tasks: TaskManager,
}

impl<Msg: 'static + Clone + Send> PipelineHandle<Msg> {
    /// Waits for every coordinator in this pipeline to terminate. A
    /// coordinator exits once it reaches `closed` (spec.md §4.3); a crash
    /// surfaces here as a join error, logged by the supervisor rather than
    /// propagated, matching `pipeflow_task::TaskManager::join`'s contract.
    pub async fn joined(&self) {
        self.tasks.join().await;
    }
}

/// Builds a pipeline: validates it is non-empty, allocates a fresh pipeline
/// reference, resolves the sink, and spawns one coordinator per fitting
/// starting from the tail (spec.md §4.4 steps 2-5). Each spec is assumed
/// already validated (structural checks plus `validate_arg`), which
/// `pipeflow_config::build_spec` performs at spec-construction time rather
/// than here — see DESIGN.md.
pub fn build_pipeline<Msg: 'static + Clone + Send>(
    specs: Vec<Arc<FittingSpec<Msg>>>,
    options: PipelineOptions<Msg>,
) -> Result<PipelineHandle<Msg>, Error> {
    if specs.is_empty() {
        return Err(Error::EmptyPipeline);
    }

    let pipeline_ref = PipelineRef::new();
    let (sink, sink_receiver) = match options.sink {
        SinkOption::Address(handle) => (handle, None),
        SinkOption::Undefined => {
            let (handle, receiver) = pipeflow_sink::channel();
            (handle, Some(receiver))
        }
    };

    let tasks = TaskManager::new(NodeLabels::new(&format!("pipeline-{pipeline_ref}")));

    let mut next = NextStage::Sink;
    let mut stages = Vec::with_capacity(specs.len());
    for spec in specs.into_iter().rev() {
        let details = spawn_coordinator(&tasks, pipeline_ref, spec, next, sink.clone(), options.log.clone(), options.trace.clone());
        next = NextStage::Stage(details.clone());
        stages.push(details);
    }
    stages.reverse();

    let head = stages.first().expect("checked non-empty above").clone();

    let supervisor = tasks.clone();
    let _handle = tokio::spawn(async move {
        supervisor.join().await;
        tracing::info!(%pipeline_ref, "pipeline supervisor exited: every coordinator has terminated");
    });

    Ok(PipelineHandle { pipeline_ref, head, stages, sink, sink_receiver, tasks })
}

/// Requests end-of-input for the whole pipeline by forwarding `client_eoi`
/// to the first stage's coordinator (spec.md §6). Asynchronous: completion
/// is signalled by the EOI record eventually arriving at the sink.
pub async fn eoi<Msg: 'static + Clone + Send>(handle: &PipelineHandle<Msg>) {
    handle.head.coordinator.client_eoi().await;
}

/// Best-effort status snapshot: queries every stage's coordinator for its
/// active worker set, then queries each of those queue managers directly
/// (spec.md §6, resolved as best-effort in the design notes). A worker that
/// does not answer within the round is simply absent; there is no retry.
pub async fn status<Msg: 'static + Clone + Send>(handle: &PipelineHandle<Msg>) -> Vec<Vec<WorkerStatus>> {
    let mut per_stage = Vec::with_capacity(handle.stages.len());
    for stage in &handle.stages {
        let mut workers = Vec::new();
        if let Some(coordinator_status) = stage.coordinator.status().await {
            for (_, queue_manager) in coordinator_status.active {
                workers.extend(queue_manager.status(stage.spec.name.clone()).await);
            }
        }
        per_stage.push(workers);
    }
    per_stage
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeflow_behavior::{BehaviorFactory, BehaviorRegistry};
    use pipeflow_behaviors::PassFactory;
    use pipeflow_config::build_spec;
    use pipeflow_proto::{Partitioner, SinkRecord};
    use std::time::Duration;

    fn registry() -> BehaviorRegistry<String> {
        BehaviorRegistry::new([("pass".to_string(), Arc::new(PassFactory) as Arc<dyn BehaviorFactory<String>>)])
    }

    #[tokio::test]
    async fn empty_pipeline_is_rejected() {
        let error = match build_pipeline::<String>(vec![], PipelineOptions::default()) {
            Ok(_) => panic!("expected build_pipeline to reject an empty fitting list"),
            Err(error) => error,
        };
        assert!(matches!(error, Error::EmptyPipeline));
    }

    #[tokio::test]
    async fn eoi_on_a_pipeline_with_no_active_workers_reaches_the_sink_immediately() {
        let config = pipeflow_config::FittingSpecConfig {
            name: "echo".to_string(),
            behavior_id: "pass".to_string(),
            arg: serde_yaml::Value::Null,
            nval: 1,
            q_limit: 8,
        };
        let spec = build_spec(config, Partitioner::Follow, &registry()).expect("valid spec");
        let handle = build_pipeline(vec![spec], PipelineOptions::default()).expect("should build");

        eoi(&handle).await;

        let receiver = handle.sink_receiver.as_ref().expect("default sink is the caller");
        let record = tokio::time::timeout(Duration::from_secs(5), receiver.recv_record())
            .await
            .expect("timed out")
            .expect("sink closed");
        assert!(matches!(record, SinkRecord::EndOfInput { .. }));
    }
}
