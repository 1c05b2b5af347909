//! An in-process cluster harness (SPEC_FULL.md, "In-process cluster
//! harness"): a fixed set of simulated nodes, each hosting its own queue
//! manager, behind a consistent-hash ring built once at construction time.
//! A real deployment replaces this with a client that talks to an external
//! ring service and a real transport, keeping every other module unchanged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pipeflow_behavior::BehaviorRegistry;
use pipeflow_context::Context;
use pipeflow_proto::{NodeId, PartitionId, QueueManagerHandle, RingClient};
use pipeflow_ring::HashRing;
use pipeflow_router::NodeDirectory;

struct NodeTable<Msg> {
    handles: Mutex<HashMap<String, QueueManagerHandle<Msg>>>,
}

impl<Msg> Default for NodeTable<Msg> {
    fn default() -> Self {
        Self { handles: Mutex::new(HashMap::new()) }
    }
}

impl<Msg: 'static + Clone + Send> NodeDirectory<Msg> for NodeTable<Msg> {
    fn queue_manager(&self, node: &NodeId) -> Option<QueueManagerHandle<Msg>> {
        self.handles.lock().expect("node table poisoned").get(&node.0).cloned()
    }
}

/// A cluster of simulated nodes, each running its own queue manager, sharing
/// one consistent-hash ring over their combined partitions.
pub struct Cluster<Msg: 'static + Clone + Send> {
    ring: Arc<dyn RingClient>,
    nodes: Arc<NodeTable<Msg>>,
}

impl<Msg: 'static + Clone + Send> Cluster<Msg> {
    /// Spawns one queue manager per entry in `node_ids`, assigning each node
    /// a contiguous block of `partitions_per_node` partitions on a ring with
    /// `vnodes_per_partition` virtual nodes per partition. Every node shares
    /// the same `behaviors` registry, the way a real deployment rolls out one
    /// binary image cluster-wide.
    pub fn spawn(
        node_ids: &[&str],
        partitions_per_node: usize,
        vnodes_per_partition: u32,
        node_wide_limit: usize,
        behaviors: BehaviorRegistry<Msg>,
    ) -> Self {
        let mut ownership = Vec::with_capacity(node_ids.len() * partitions_per_node);
        for (node_index, node_id) in node_ids.iter().enumerate() {
            for offset in 0..partitions_per_node {
                let partition = PartitionId((node_index * partitions_per_node + offset) as u32);
                ownership.push((partition, NodeId((*node_id).to_string())));
            }
        }

        let ring: Arc<dyn RingClient> = Arc::new(HashRing::new(ownership, vnodes_per_partition));
        let nodes: Arc<NodeTable<Msg>> = Arc::new(NodeTable::default());

        for node_id in node_ids {
            let handle = pipeflow_queue::spawn_queue_manager(
                *node_id,
                node_wide_limit,
                behaviors.clone(),
                Context::new(),
                ring.clone(),
                nodes.clone(),
            );
            let _ = nodes.handles.lock().expect("node table poisoned").insert((*node_id).to_string(), handle);
        }

        Self { ring, nodes }
    }

    /// The ring this cluster's queue managers and routers resolve preflists
    /// against.
    pub fn ring(&self) -> &dyn RingClient {
        self.ring.as_ref()
    }

    /// The directory mapping node ids to queue manager addresses.
    pub fn directory(&self) -> &dyn NodeDirectory<Msg> {
        self.nodes.as_ref()
    }
}
