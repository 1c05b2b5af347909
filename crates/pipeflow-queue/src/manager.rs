//! The per-node queue manager actor: owns every `(fitting, partition)`
//! queue hosted on this node, spawns and supervises workers, and handles
//! the restart-once-then-forward protocol on worker crash (spec.md §4.1).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use pipeflow_behavior::BehaviorRegistry;
use pipeflow_context::Context;
use pipeflow_proto::{
    CoordinatorHandle, EnqueueOutcome, Envelope, FittingDetails, LogKind, PartitionId, QueueManagerHandle, QueueManagerMsg, RejectReason,
    RingClient, WorkerState, WorkerStatus,
};
use pipeflow_router::NodeDirectory;
use pipeflow_signal::WorkSignal;
use pipeflow_task::labels::{ActorLabels, NodeLabels};
use pipeflow_task::{ActorCleaner, JoinHandleTask, TaskManager};

use crate::record::{Blocked, QueueRecord};
use crate::worker::run_worker;

type QueueKey = (Arc<str>, PartitionId);

/// Spawns a queue manager actor and returns its address. `node_wide_limit`
/// caps `ready` + `blocking` across every queue a fitting's `q_limit` would
/// otherwise allow unbounded (spec.md §3 invariant 3).
pub fn spawn_queue_manager<Msg: 'static + Clone + Send>(
    node_id: impl Into<Arc<str>>,
    node_wide_limit: usize,
    behaviors: BehaviorRegistry<Msg>,
    context: Context,
    ring: Arc<dyn RingClient>,
    nodes: Arc<dyn NodeDirectory<Msg>>,
) -> QueueManagerHandle<Msg> {
    let node_id = node_id.into();
    let (tx, rx) = mpsc::channel(1024);
    let self_handle = QueueManagerHandle::from_sender(node_id.clone(), tx);
    let tasks = TaskManager::new(NodeLabels::new(&node_id));

    let actor = QueueManagerActor {
        node_id,
        node_wide_limit,
        queues: HashMap::new(),
        behaviors,
        context,
        ring,
        nodes,
        self_handle: self_handle.clone(),
        tasks,
    };
    let _handle = tokio::spawn(actor.run(rx));

    self_handle
}

struct QueueManagerActor<Msg: 'static + Clone + Send> {
    node_id: Arc<str>,
    node_wide_limit: usize,
    queues: HashMap<QueueKey, QueueRecord<Msg>>,
    behaviors: BehaviorRegistry<Msg>,
    context: Context,
    ring: Arc<dyn RingClient>,
    nodes: Arc<dyn NodeDirectory<Msg>>,
    self_handle: QueueManagerHandle<Msg>,
    tasks: TaskManager,
}

impl<Msg: 'static + Clone + Send> QueueManagerActor<Msg> {
    async fn run(mut self, mut rx: mpsc::Receiver<QueueManagerMsg<Msg>>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                QueueManagerMsg::Enqueue { envelope, reply } => self.handle_enqueue(envelope, reply).await,
                QueueManagerMsg::WorkerDequeue { fitting, partition, reply } => self.handle_worker_dequeue(fitting, partition, reply),
                QueueManagerMsg::DeliverDetails { fitting, partition, details } => self.handle_deliver_details(fitting, partition, details),
                QueueManagerMsg::MarkEoi { fitting } => self.handle_mark_eoi(fitting),
                QueueManagerMsg::WorkerDone { fitting, partition } => self.handle_worker_done(fitting, partition).await,
                QueueManagerMsg::WorkerCrashed {
                    fitting,
                    partition,
                    reason,
                    already_logged,
                } => self.handle_worker_crashed(fitting, partition, reason, already_logged).await,
                QueueManagerMsg::ForwardCurrent { fitting, partition } => self.handle_forward_current(fitting, partition),
                QueueManagerMsg::Completed { fitting, partition, ok } => self.handle_completed(fitting, partition, ok),
                QueueManagerMsg::Status { fitting, reply } => {
                    let _ = reply.send(self.handle_status(fitting));
                }
            }
        }
    }

    async fn handle_enqueue(&mut self, envelope: Envelope<Msg>, reply: oneshot::Sender<EnqueueOutcome>) {
        let Some(partition) = envelope.target_partition() else {
            let _ = reply.send(EnqueueOutcome::Rejected(RejectReason::PreflistExhausted));
            return;
        };
        let coordinator = envelope.coordinator.clone();
        let key: QueueKey = (envelope.fitting_name.clone(), partition);
        let is_new = !self.queues.contains_key(&key);

        let record = self.queues.entry(key.clone()).or_insert_with(QueueRecord::new);

        if record.forwarding {
            let details = record.details.clone();
            let _ = reply.send(EnqueueOutcome::Accepted);
            spawn_forward(self.ring.clone(), self.nodes.clone(), key.0.clone(), envelope, details);
            return;
        }

        if record.eoi_received {
            let _ = reply.send(EnqueueOutcome::Rejected(RejectReason::EoiClosed));
            return;
        }

        if let Some(waiting) = record.waiting_reply.take() {
            let value = envelope.value.clone();
            let last_preflist = envelope.last_preflist();
            record.in_flight = Some(envelope);
            record.state = WorkerState::Processing;
            let _ = waiting.send(WorkSignal::Input { value, last_preflist });
            let _ = reply.send(EnqueueOutcome::Accepted);
        } else {
            let limit = record.effective_limit(self.node_wide_limit);
            if record.ready.len() < limit {
                record.ready.push_back(envelope);
                let _ = reply.send(EnqueueOutcome::Accepted);
            } else {
                record.blocking.push_back(Blocked { reply, envelope });
            }
        }

        if is_new && !record.requesting_details {
            record.requesting_details = true;
            spawn_detail_request(coordinator, self.self_handle.clone(), key.0, partition);
        }
    }

    fn handle_worker_dequeue(&mut self, fitting: Arc<str>, partition: PartitionId, reply: oneshot::Sender<WorkSignal<Msg>>) {
        let key = (fitting, partition);
        let Some(record) = self.queues.get_mut(&key) else {
            let _ = reply.send(WorkSignal::Stop);
            return;
        };

        record.in_flight = None;

        if let Some(envelope) = record.ready.pop_front() {
            if let Some(blocked) = record.blocking.pop_front() {
                record.ready.push_back(blocked.envelope);
                let _ = blocked.reply.send(EnqueueOutcome::Accepted);
            }
            let value = envelope.value.clone();
            let last_preflist = envelope.last_preflist();
            record.in_flight = Some(envelope);
            record.state = WorkerState::Processing;
            let _ = reply.send(WorkSignal::Input { value, last_preflist });
        } else if record.eoi_received {
            record.state = WorkerState::Done;
            let _ = reply.send(WorkSignal::EndOfInput);
        } else {
            record.state = WorkerState::Waiting;
            record.waiting_reply = Some(reply);
        }
    }

    fn handle_deliver_details(&mut self, fitting: Arc<str>, partition: PartitionId, details: Arc<FittingDetails<Msg>>) {
        let key = (fitting, partition);
        let Some(record) = self.queues.get_mut(&key) else { return };

        record.requesting_details = false;
        record.details = Some(details.clone());

        if record.has_worker {
            return;
        }
        record.has_worker = true;

        spawn_worker(
            self.self_handle.clone(),
            self.behaviors.clone(),
            self.context.clone(),
            self.ring.clone(),
            self.nodes.clone(),
            self.node_id.clone(),
            &self.tasks,
            partition,
            details,
        );
    }

    fn handle_mark_eoi(&mut self, fitting: Arc<str>) {
        for ((name, _partition), record) in self.queues.iter_mut() {
            if name.as_ref() != fitting.as_ref() {
                continue;
            }
            record.eoi_received = true;
            if record.ready.is_empty() && record.in_flight.is_none() {
                if let Some(waiting) = record.waiting_reply.take() {
                    record.state = WorkerState::Done;
                    let _ = waiting.send(WorkSignal::EndOfInput);
                }
            }
        }
    }

    async fn handle_worker_done(&mut self, fitting: Arc<str>, partition: PartitionId) {
        let key = (fitting, partition);
        if let Some(record) = self.queues.remove(&key) {
            if let Some(details) = record.details {
                details.coordinator.worker_done(partition).await;
            }
        }
    }

    async fn handle_worker_crashed(&mut self, fitting: Arc<str>, partition: PartitionId, reason: String, already_logged: bool) {
        let key = (fitting.clone(), partition);
        let Some(record) = self.queues.get_mut(&key) else { return };

        record.has_worker = false;
        let details = record.details.clone();

        if !already_logged {
            if let Some(details) = &details {
                details
                    .sink
                    .log(details.pipeline_ref, fitting.clone(), LogKind::UnreachableWorker, reason.clone(), HashMap::new())
                    .await;
            }
        }

        if !record.restart_attempted {
            record.restart_attempted = true;
            if let Some(details) = details.clone() {
                record.has_worker = true;
                spawn_worker(
                    self.self_handle.clone(),
                    self.behaviors.clone(),
                    self.context.clone(),
                    self.ring.clone(),
                    self.nodes.clone(),
                    self.node_id.clone(),
                    &self.tasks,
                    partition,
                    details,
                );
                return;
            }
        }

        if let Some(details) = &details {
            details
                .sink
                .log(details.pipeline_ref, fitting.clone(), LogKind::WorkerRestartFailed, reason, HashMap::new())
                .await;
        }
        record.forwarding = true;

        let ready: Vec<_> = record.ready.drain(..).collect();
        let blocking: Vec<_> = record.blocking.drain(..).collect();
        let in_flight = record.in_flight.take();

        for envelope in ready {
            spawn_forward(self.ring.clone(), self.nodes.clone(), fitting.clone(), envelope, details.clone());
        }
        for blocked in blocking {
            let _ = blocked.reply.send(EnqueueOutcome::Accepted);
            spawn_forward(self.ring.clone(), self.nodes.clone(), fitting.clone(), blocked.envelope, details.clone());
        }
        if let Some(envelope) = in_flight {
            spawn_forward(self.ring.clone(), self.nodes.clone(), fitting.clone(), envelope, details.clone());
        }

        if let Some(details) = &details {
            details.coordinator.worker_down(partition).await;
        }

        let drained = self.queues.get(&key).map(QueueRecord::is_drained).unwrap_or(false);
        if drained {
            let _ = self.queues.remove(&key);
        }
    }

    fn handle_forward_current(&mut self, fitting: Arc<str>, partition: PartitionId) {
        let key = (fitting.clone(), partition);
        let Some(record) = self.queues.get_mut(&key) else { return };
        let Some(envelope) = record.in_flight.take() else { return };
        let details = record.details.clone();
        spawn_forward(self.ring.clone(), self.nodes.clone(), fitting, envelope, details);
    }

    fn handle_completed(&mut self, fitting: Arc<str>, partition: PartitionId, ok: bool) {
        let key = (fitting, partition);
        let Some(record) = self.queues.get_mut(&key) else { return };
        record.in_flight = None;
        // A completed input, ok or not, means the current worker is alive
        // and making progress: a later crash is a new incident, entitled to
        // its own restart attempt, not the one already spent on a prior
        // crash of this same queue record.
        record.restart_attempted = false;
        if ok {
            record.processed += 1;
        } else {
            record.failures += 1;
        }
    }

    fn handle_status(&self, fitting: Arc<str>) -> Vec<WorkerStatus> {
        self.queues
            .iter()
            .filter(|((name, _), _)| name.as_ref() == fitting.as_ref())
            .map(|((name, partition), record)| WorkerStatus {
                node_id: self.node_id.to_string(),
                partition: *partition,
                fitting_name: name.clone(),
                behavior_id: record
                    .details
                    .as_ref()
                    .map_or_else(|| "unknown".to_string(), |details| details.spec.behavior_id.clone()),
                state: record.state,
                inputs_done: record.eoi_received,
                queue_length: record.ready.len(),
                blocking_length: record.blocking.len(),
                started: record.started,
                processed: record.processed,
                failures: record.failures,
                work_time_us: 0,
                idle_time_us: 0,
            })
            .collect()
    }
}

/// Asks the fitting's coordinator for its details, then delivers the reply
/// back to this queue manager, mirroring the request/reply round trip
/// spec.md §4.1 describes for a queue seeing its first input.
fn spawn_detail_request<Msg: 'static + Clone + Send>(
    coordinator: CoordinatorHandle<Msg>,
    self_handle: QueueManagerHandle<Msg>,
    fitting: Arc<str>,
    partition: PartitionId,
) {
    let _handle = tokio::spawn(async move {
        if let Some(details) = coordinator.get_details(self_handle.clone(), partition).await {
            self_handle.deliver_details(fitting, partition, details).await;
        }
    });
}

/// Advances `envelope` to its next preflist entry and re-submits it, or logs
/// `ForwardPreflistExhausted` if there is none left (spec.md §4.1, §7).
fn spawn_forward<Msg: 'static + Clone + Send>(
    ring: Arc<dyn RingClient>,
    nodes: Arc<dyn NodeDirectory<Msg>>,
    fitting: Arc<str>,
    envelope: Envelope<Msg>,
    details: Option<Arc<FittingDetails<Msg>>>,
) {
    let _handle = tokio::spawn(async move {
        match envelope.advance_preflist() {
            Some(advanced) => {
                let _ = pipeflow_router::forward(&*ring, &*nodes, advanced).await;
            }
            None => {
                if let Some(details) = details {
                    details
                        .sink
                        .log(
                            details.pipeline_ref,
                            fitting,
                            LogKind::ForwardPreflistExhausted,
                            "preflist exhausted while forwarding".to_string(),
                            HashMap::new(),
                        )
                        .await;
                }
            }
        }
    });
}

/// Spawns a worker and a supervisor task over it: the supervisor awaits the
/// worker's join handle and reports a panic as `worker_crashed`, then
/// doubles as the task `TaskManager` tracks for this node's graceful
/// shutdown (spec.md §9's actor-supervision design note).
#[allow(clippy::too_many_arguments)]
fn spawn_worker<Msg: 'static + Clone + Send>(
    queue_manager: QueueManagerHandle<Msg>,
    behaviors: BehaviorRegistry<Msg>,
    context: Context,
    ring: Arc<dyn RingClient>,
    nodes: Arc<dyn NodeDirectory<Msg>>,
    node_id: Arc<str>,
    tasks: &TaskManager,
    partition: PartitionId,
    details: Arc<FittingDetails<Msg>>,
) {
    let fitting = details.spec.name.clone();
    let actor_labels = ActorLabels::new("worker", fitting.as_ref(), Some(partition.0));
    let cleanup_labels = actor_labels.clone();
    let node_labels = tasks.node_labels();

    let monitor = queue_manager.clone();
    let monitor_fitting = fitting.clone();

    let join_handle: JoinHandleTask = tokio::spawn(async move {
        let inner = tokio::spawn(run_worker(partition, details, queue_manager, behaviors, context, ring, nodes, node_id));
        if let Err(join_error) = inner.await {
            monitor.worker_crashed(monitor_fitting, partition, join_error.to_string(), false).await;
        }
        TaskManager::no_op_cleaner(node_labels, cleanup_labels) as Box<dyn ActorCleaner>
    });

    tasks.register(join_handle, &actor_labels);
}
