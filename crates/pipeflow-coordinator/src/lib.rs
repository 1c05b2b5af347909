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

//! The per-fitting, per-pipeline coordinator (spec.md §4.3): serves spec
//! lookups to queue managers, tracks the active worker set `W`, and drives
//! end-of-input through the `open → draining → closed` state machine.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use pipeflow_context::{LogMode, TraceFilter};
use pipeflow_proto::{
    CoordinatorHandle, CoordinatorMsg, CoordinatorState, CoordinatorStatus, FittingDetails, FittingSpec, NextStage, PartitionId,
    PipelineRef, QueueManagerHandle, SinkHandle,
};
use pipeflow_task::labels::ActorLabels;
use pipeflow_task::{JoinHandleTask, TaskManager};

/// Spawns a fitting's coordinator and returns the details workers and queue
/// managers resolve through it. `next` must already be built, since a
/// fitting's own details embed the next stage's — pipelines are built
/// right-to-left (spec.md §4.4).
pub fn spawn_coordinator<Msg: 'static + Clone + Send>(
    tasks: &TaskManager,
    pipeline_ref: PipelineRef,
    spec: Arc<FittingSpec<Msg>>,
    next: NextStage<Msg>,
    sink: SinkHandle<Msg>,
    log_mode: LogMode,
    trace_filter: TraceFilter,
) -> Arc<FittingDetails<Msg>> {
    let fitting_name = spec.name.clone();
    let (tx, rx) = mpsc::channel(256);
    let coordinator = CoordinatorHandle::from_sender(tx);
    let details = Arc::new(FittingDetails {
        pipeline_ref,
        spec,
        coordinator,
        next,
        sink,
        log_mode,
        trace_filter,
    });

    let actor = CoordinatorActor {
        details: details.clone(),
        w: HashMap::new(),
        state: CoordinatorState::Open,
    };

    let node_labels = tasks.node_labels();
    let actor_labels = ActorLabels::new("coordinator", &fitting_name, None);
    let cleanup_labels = actor_labels.clone();
    let join_handle: JoinHandleTask = tokio::spawn(async move {
        actor.run(rx).await;
        TaskManager::no_op_cleaner(node_labels, cleanup_labels)
    });
    tasks.register(join_handle, &actor_labels);

    details
}

struct CoordinatorActor<Msg: 'static + Clone + Send> {
    details: Arc<FittingDetails<Msg>>,
    w: HashMap<PartitionId, QueueManagerHandle<Msg>>,
    state: CoordinatorState,
}

impl<Msg: 'static + Clone + Send> CoordinatorActor<Msg> {
    async fn run(mut self, mut rx: mpsc::Receiver<CoordinatorMsg<Msg>>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                CoordinatorMsg::GetDetails { caller, partition, reply } => self.handle_get_details(caller, partition, reply),
                CoordinatorMsg::WorkerDone { partition } => self.handle_worker_gone(partition).await,
                CoordinatorMsg::WorkerDown { partition } => self.handle_worker_gone(partition).await,
                CoordinatorMsg::ClientEoi => self.handle_client_eoi().await,
                CoordinatorMsg::Status { reply } => self.handle_status(reply),
            }

            if self.state == CoordinatorState::Closed {
                tracing::debug!(fitting = %self.details.spec.name, "coordinator closed, exiting");
                break;
            }
        }
    }

    fn handle_get_details(
        &mut self,
        caller: QueueManagerHandle<Msg>,
        partition: PartitionId,
        reply: oneshot::Sender<Arc<FittingDetails<Msg>>>,
    ) {
        let _ = self.w.insert(partition, caller);
        let _ = reply.send(self.details.clone());
    }

    async fn handle_worker_gone(&mut self, partition: PartitionId) {
        let _ = self.w.remove(&partition);
        self.maybe_close().await;
    }

    async fn handle_client_eoi(&mut self) {
        if self.state != CoordinatorState::Open {
            return;
        }
        self.state = CoordinatorState::Draining;
        tracing::debug!(fitting = %self.details.spec.name, active = self.w.len(), "draining");
        for queue_manager in self.w.values() {
            queue_manager.mark_eoi(self.details.spec.name.clone()).await;
        }
        self.maybe_close().await;
    }

    fn handle_status(&self, reply: oneshot::Sender<CoordinatorStatus<Msg>>) {
        let active = self.w.iter().map(|(partition, handle)| (*partition, handle.clone())).collect();
        let _ = reply.send(CoordinatorStatus { state: self.state, active });
    }

    async fn maybe_close(&mut self) {
        if self.state != CoordinatorState::Draining || !self.w.is_empty() {
            return;
        }
        self.state = CoordinatorState::Closed;
        match &self.details.next {
            NextStage::Sink => self.details.sink.end_of_input(self.details.pipeline_ref).await,
            NextStage::Stage(next) => next.coordinator.client_eoi().await,
        }
    }
}
