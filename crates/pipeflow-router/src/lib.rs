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

//! Routing: hashing an input to a preflist, resolving the preflist's head
//! node to a queue manager address, and delivering the envelope
//! (spec.md §4.5).

use std::sync::Arc;

use async_trait::async_trait;
use pipeflow_proto::{
    EnqueueOutcome, Envelope, FittingDetails, NextStage, NodeId, OutputSink, Partitioner, PartitionId, PipelineRef, PreflistEntry,
    QueueManagerHandle, RejectReason, RingClient, RouterError, SinkHandle,
};

/// Resolves a node id to its queue manager's address. The transport
/// collaborator spec.md §2 treats as external; in this repo a `Cluster`
/// (root crate) owns one queue manager per node and implements this trait
/// directly over its in-memory map.
pub trait NodeDirectory<Msg>: Send + Sync {
    /// Returns the queue manager handle for `node`, if this directory knows
    /// about it.
    fn queue_manager(&self, node: &NodeId) -> Option<QueueManagerHandle<Msg>>;
}

/// Resolves `value`'s preflist under `details.spec.partitioner` and sends it
/// to the preflist head's queue manager, waiting for the synchronous
/// accept/reject response (spec.md §4.1, §4.5).
///
/// Used both by the client's `queue_work` entry point (against stage one's
/// details) and by [`StageRouter::send_output`] (against the next stage's
/// details).
pub async fn queue_work<Msg: 'static + Clone + Send>(
    ring: &dyn RingClient,
    nodes: &dyn NodeDirectory<Msg>,
    details: &FittingDetails<Msg>,
    value: Msg,
    source_partition: Option<PartitionId>,
) -> EnqueueOutcome {
    let preflist = match resolve_preflist(ring, &details.spec.partitioner, &value, details.spec.nval, source_partition) {
        Some(preflist) if !preflist.is_empty() => preflist,
        _ => return EnqueueOutcome::Rejected(RejectReason::PreflistExhausted),
    };

    let preflist_remaining: Vec<PartitionId> = preflist.iter().map(|entry| entry.partition).collect();
    let head = &preflist[0];

    let Some(queue_manager) = nodes.queue_manager(&head.node) else {
        tracing::warn!(fitting = %details.spec.name, node = %head.node.0, "preflist head node has no known queue manager");
        return EnqueueOutcome::Rejected(RejectReason::UnknownFitting);
    };

    let envelope = Envelope {
        pipeline_ref: details.pipeline_ref,
        coordinator: details.coordinator.clone(),
        fitting_name: details.spec.name.clone(),
        source_partition,
        value,
        preflist_remaining,
    };

    queue_manager.enqueue(envelope).await
}

/// Re-submits an envelope whose head partition has already been tried, using
/// its existing `preflist_remaining` rather than recomputing one from the
/// partitioner (spec.md §4.1's forwarding). Resolves the current head's
/// owning node directly from the ring, since the preflist isn't regenerated.
pub async fn forward<Msg: 'static + Clone + Send>(ring: &dyn RingClient, nodes: &dyn NodeDirectory<Msg>, envelope: Envelope<Msg>) -> EnqueueOutcome {
    let Some(head) = envelope.target_partition() else {
        return EnqueueOutcome::Rejected(RejectReason::PreflistExhausted);
    };
    let Some(node) = ring.owner(head) else {
        return EnqueueOutcome::Rejected(RejectReason::UnknownFitting);
    };
    let Some(queue_manager) = nodes.queue_manager(&node) else {
        return EnqueueOutcome::Rejected(RejectReason::UnknownFitting);
    };
    queue_manager.enqueue(envelope).await
}

fn resolve_preflist<Msg>(
    ring: &dyn RingClient,
    partitioner: &Partitioner<Msg>,
    value: &Msg,
    nval: usize,
    source_partition: Option<PartitionId>,
) -> Option<Vec<PreflistEntry>> {
    match partitioner {
        Partitioner::Follow => {
            // spec.md §3 invariant 6: a follow input always carries a
            // source partition and the router skips hashing entirely.
            let partition = source_partition?;
            let node = ring.owner(partition)?;
            Some(vec![PreflistEntry { partition, node }])
        }
        Partitioner::Hash(hash_fn) => {
            let hash = hash_fn(value);
            let preflist = ring.preflist(hash, nval);
            if preflist.is_empty() {
                None
            } else {
                Some(preflist)
            }
        }
    }
}

/// An [`OutputSink`] bound to one fitting's next stage: what a worker's
/// `EffectHandler::send_output` actually calls into.
pub struct StageRouter<Msg> {
    pipeline_ref: PipelineRef,
    from_name: Arc<str>,
    next: NextStage<Msg>,
    ring: Arc<dyn RingClient>,
    nodes: Arc<dyn NodeDirectory<Msg>>,
    sink: SinkHandle<Msg>,
}

impl<Msg: 'static + Clone + Send> StageRouter<Msg> {
    /// Builds a router for one worker's output, fixed to the fitting's
    /// resolved `next` stage for the lifetime of the worker.
    pub fn new(
        pipeline_ref: PipelineRef,
        from_name: Arc<str>,
        next: NextStage<Msg>,
        ring: Arc<dyn RingClient>,
        nodes: Arc<dyn NodeDirectory<Msg>>,
        sink: SinkHandle<Msg>,
    ) -> Self {
        Self {
            pipeline_ref,
            from_name,
            next,
            ring,
            nodes,
            sink,
        }
    }
}

#[async_trait]
impl<Msg: 'static + Clone + Send> OutputSink<Msg> for StageRouter<Msg> {
    async fn send_output(&self, from_partition: PartitionId, value: Msg) -> Result<(), RouterError> {
        match &self.next {
            NextStage::Sink => {
                self.sink.result(self.pipeline_ref, self.from_name.clone(), value).await;
                Ok(())
            }
            NextStage::Stage(details) => match queue_work(&*self.ring, &*self.nodes, details, value, Some(from_partition)).await {
                EnqueueOutcome::Accepted => Ok(()),
                EnqueueOutcome::Rejected(reason) => Err(RouterError::Rejected { reason }),
            },
        }
    }
}
