//! End-to-end tests for a node's queue manager: normal drain-to-sink, and
//! the restart-once-then-forward protocol on a worker crash (spec.md §4.1).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pipeflow_behavior::{BehaviorFactory, BehaviorRegistry, Error as BehaviorError, FittingBehavior, Verdict};
use pipeflow_behaviors::PassFactory;
use pipeflow_context::{Context, LogMode, TraceFilter};
use pipeflow_proto::{
    CoordinatorHandle, CoordinatorMsg, EffectHandler, EnqueueOutcome, FittingDetails, FittingSpec, LogKind, NextStage, NodeId,
    Partitioner, PartitionId, PipelineRef, PreflistEntry, QueueManagerHandle, RingClient, SinkHandle, SinkRecord,
};
use pipeflow_queue::spawn_queue_manager;
use pipeflow_router::NodeDirectory;

struct FixedRing {
    preflist: Vec<PreflistEntry>,
    owners: HashMap<u32, NodeId>,
}

impl RingClient for FixedRing {
    fn preflist(&self, _hash: pipeflow_proto::HashValue, nval: usize) -> Vec<PreflistEntry> {
        self.preflist.iter().take(nval).cloned().collect()
    }

    fn owner(&self, partition: PartitionId) -> Option<NodeId> {
        self.owners.get(&partition.0).cloned()
    }
}

#[derive(Default)]
struct TestDirectory {
    handles: Mutex<HashMap<String, QueueManagerHandle<String>>>,
}

impl TestDirectory {
    fn register(&self, node: &str, handle: QueueManagerHandle<String>) {
        let _ = self.handles.lock().expect("poisoned").insert(node.to_string(), handle);
    }
}

impl NodeDirectory<String> for TestDirectory {
    fn queue_manager(&self, node: &NodeId) -> Option<QueueManagerHandle<String>> {
        self.handles.lock().expect("poisoned").get(&node.0).cloned()
    }
}

/// A behavior that always panics, standing in for an uncaught exception
/// (spec.md §4.2) so a test can drive a worker crash deterministically.
struct Crash;

#[async_trait]
impl FittingBehavior<String> for Crash {
    async fn process(&mut self, _input: String, _last_preflist: bool, _effects: &EffectHandler<String>) -> Verdict {
        panic!("simulated uncaught exception");
    }
}

struct CrashFactory;

impl BehaviorFactory<String> for CrashFactory {
    fn create(&self, _arg: serde_yaml::Value) -> Result<Box<dyn FittingBehavior<String> + Send>, BehaviorError> {
        Ok(Box::new(Crash))
    }
}

/// A stub coordinator for a single fitting: answers every `GetDetails` with
/// whatever was last stashed in `details`, and forwards `WorkerDone`/
/// `WorkerDown` notifications onto a channel a test can assert against.
fn spawn_stub_coordinator(
    details: Arc<Mutex<Option<Arc<FittingDetails<String>>>>>,
) -> (CoordinatorHandle<String>, tokio::sync::mpsc::UnboundedReceiver<(PartitionId, bool)>) {
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let (coord_tx, mut coord_rx) = tokio::sync::mpsc::channel::<CoordinatorMsg<String>>(32);

    let _handle = tokio::spawn(async move {
        while let Some(msg) = coord_rx.recv().await {
            match msg {
                CoordinatorMsg::GetDetails { reply, .. } => {
                    let current = details.lock().expect("poisoned").clone().expect("details set before use");
                    let _ = reply.send(current);
                }
                CoordinatorMsg::WorkerDone { partition } => {
                    let _ = events_tx.send((partition, true));
                }
                CoordinatorMsg::WorkerDown { partition } => {
                    let _ = events_tx.send((partition, false));
                }
                CoordinatorMsg::ClientEoi => {}
                CoordinatorMsg::Status { reply } => {
                    let _ = reply.send(pipeflow_proto::CoordinatorStatus {
                        state: pipeflow_proto::CoordinatorState::Open,
                        active: vec![],
                    });
                }
            }
        }
    });

    (CoordinatorHandle::from_sender(coord_tx), events_rx)
}

async fn recv_timeout<T>(rx: &mut tokio::sync::mpsc::UnboundedReceiver<T>) -> Option<T> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.ok().flatten()
}

#[tokio::test]
async fn input_flows_through_to_sink_and_worker_done_fires() {
    let ring: Arc<dyn RingClient> = Arc::new(FixedRing {
        preflist: vec![PreflistEntry { partition: PartitionId(0), node: NodeId("node-a".into()) }],
        owners: HashMap::from([(0, NodeId("node-a".into()))]),
    });
    let directory = Arc::new(TestDirectory::default());
    let (sink_tx, sink_rx) = flume::unbounded();
    let sink = SinkHandle::from_sender(sink_tx);

    let details_slot: Arc<Mutex<Option<Arc<FittingDetails<String>>>>> = Arc::new(Mutex::new(None));
    let (coordinator, mut events) = spawn_stub_coordinator(details_slot.clone());

    let details = Arc::new(FittingDetails {
        pipeline_ref: PipelineRef::new(),
        spec: Arc::new(FittingSpec {
            name: Arc::from("echo"),
            behavior_id: "pass".to_string(),
            arg: serde_yaml::Value::Null,
            partitioner: Partitioner::Hash(Arc::new(|_: &String| 0)),
            nval: 1,
            q_limit: 8,
        }),
        coordinator,
        next: NextStage::Sink,
        sink,
        log_mode: LogMode::Drop,
        trace_filter: TraceFilter::Drop,
    });
    *details_slot.lock().expect("poisoned") = Some(details.clone());

    let registry = BehaviorRegistry::new([("pass".to_string(), Arc::new(PassFactory) as Arc<dyn BehaviorFactory<String>>)]);
    let queue_manager = spawn_queue_manager("node-a", 64, registry, Context::new(), ring.clone(), directory.clone());
    directory.register("node-a", queue_manager.clone());

    let outcome = pipeflow_router::queue_work(&*ring, &*directory, &details, "hello".to_string(), None).await;
    assert_eq!(outcome, EnqueueOutcome::Accepted);

    let record = tokio::time::timeout(Duration::from_secs(5), sink_rx.recv_async())
        .await
        .expect("timed out waiting for sink record")
        .expect("sink channel closed");
    match record {
        SinkRecord::Result { value, .. } => assert_eq!(value, "hello"),
        _ => panic!("expected a result record"),
    }

    queue_manager.mark_eoi(Arc::from("echo")).await;

    let (partition, ok) = recv_timeout(&mut events).await.expect("timed out waiting for worker_done");
    assert_eq!(partition, PartitionId(0));
    assert!(ok, "expected a clean WorkerDone, not a WorkerDown");
}

#[tokio::test]
async fn worker_crash_restarts_once_then_forwards_to_next_preflist_entry() {
    let ring: Arc<dyn RingClient> = Arc::new(FixedRing {
        preflist: vec![
            PreflistEntry { partition: PartitionId(0), node: NodeId("node-a".into()) },
            PreflistEntry { partition: PartitionId(1), node: NodeId("node-b".into()) },
        ],
        owners: HashMap::from([(0, NodeId("node-a".into())), (1, NodeId("node-b".into()))]),
    });
    let directory = Arc::new(TestDirectory::default());
    let (sink_tx, sink_rx) = flume::unbounded();
    let sink = SinkHandle::from_sender(sink_tx);

    let details_slot: Arc<Mutex<Option<Arc<FittingDetails<String>>>>> = Arc::new(Mutex::new(None));
    let (coordinator, mut events) = spawn_stub_coordinator(details_slot.clone());

    let details = Arc::new(FittingDetails {
        pipeline_ref: PipelineRef::new(),
        spec: Arc::new(FittingSpec {
            name: Arc::from("flaky"),
            behavior_id: "crash".to_string(),
            arg: serde_yaml::Value::Null,
            partitioner: Partitioner::Hash(Arc::new(|_: &String| 0)),
            nval: 2,
            q_limit: 8,
        }),
        coordinator,
        next: NextStage::Sink,
        sink,
        log_mode: LogMode::Drop,
        trace_filter: TraceFilter::Drop,
    });
    *details_slot.lock().expect("poisoned") = Some(details.clone());

    // node-a always crashes on this fitting; node-b actually runs it, so a
    // successful forward shows up as a result in the sink.
    let crash_registry = BehaviorRegistry::new([("crash".to_string(), Arc::new(CrashFactory) as Arc<dyn BehaviorFactory<String>>)]);
    let pass_registry = BehaviorRegistry::new([("crash".to_string(), Arc::new(PassFactory) as Arc<dyn BehaviorFactory<String>>)]);

    let node_a = spawn_queue_manager("node-a", 64, crash_registry, Context::new(), ring.clone(), directory.clone());
    let node_b = spawn_queue_manager("node-b", 64, pass_registry, Context::new(), ring.clone(), directory.clone());
    directory.register("node-a", node_a);
    directory.register("node-b", node_b);

    let outcome = pipeflow_router::queue_work(&*ring, &*directory, &details, "hello".to_string(), None).await;
    assert_eq!(outcome, EnqueueOutcome::Accepted);

    // Each panic inside `Crash::process` is caught locally by the worker and
    // logged as `exception`, not `unreachable_worker`: the manager only logs
    // `unreachable_worker` for terminations it wasn't told were already
    // explained. One `exception` log per crash (the first attempt, then the
    // single restart), followed by `worker_restart_failed` once the restart
    // also crashes, then the forwarded result from node-b.
    async fn next_log(sink_rx: &flume::Receiver<SinkRecord<String>>) -> (LogKind, String) {
        match tokio::time::timeout(Duration::from_secs(5), sink_rx.recv_async())
            .await
            .expect("timed out waiting for log record")
            .expect("sink channel closed")
        {
            SinkRecord::Log { kind, reason, .. } => (kind, reason),
            _ => panic!("expected a log record"),
        }
    }

    let (kind, reason) = next_log(&sink_rx).await;
    assert_eq!(kind, LogKind::Exception);
    assert!(reason.contains("simulated uncaught exception"), "unexpected reason: {reason}");

    let (kind, reason) = next_log(&sink_rx).await;
    assert_eq!(kind, LogKind::Exception);
    assert!(reason.contains("simulated uncaught exception"), "unexpected reason: {reason}");

    let (kind, _reason) = next_log(&sink_rx).await;
    assert_eq!(kind, LogKind::WorkerRestartFailed);

    let record = tokio::time::timeout(Duration::from_secs(5), sink_rx.recv_async())
        .await
        .expect("timed out waiting for forwarded output")
        .expect("sink channel closed");
    match record {
        SinkRecord::Result { value, .. } => assert_eq!(value, "hello"),
        _ => panic!("expected a result record from the forwarded worker"),
    }

    let (partition, ok) = recv_timeout(&mut events).await.expect("timed out waiting for worker_down");
    assert_eq!(partition, PartitionId(0));
    assert!(!ok, "expected a WorkerDown for the abandoned node-a partition");
}
