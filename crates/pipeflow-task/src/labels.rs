//! Labels identifying a node or a long-lived actor spawned on it.

/// Labels for a single node in the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLabels {
    /// The node id.
    pub node_id: String,
}

impl Default for NodeLabels {
    fn default() -> Self {
        Self {
            node_id: "undefined".to_string(),
        }
    }
}

impl NodeLabels {
    /// Creates new node labels.
    pub fn new(node_id: &str) -> Self {
        Self { node_id: node_id.into() }
    }
}

/// Labels identifying a long-lived actor: a worker, a coordinator, or a
/// queue manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorLabels {
    /// The kind of actor ("worker", "coordinator", "queue-manager").
    pub kind: String,
    /// The fitting this actor serves.
    pub fitting_name: String,
    /// The partition this actor serves, when applicable.
    pub partition: Option<u32>,
}

impl ActorLabels {
    /// Creates new actor labels.
    pub fn new(kind: &str, fitting_name: &str, partition: Option<u32>) -> Self {
        Self {
            kind: kind.into(),
            fitting_name: fitting_name.into(),
            partition,
        }
    }

    /// A unique, human-readable id for this actor.
    pub fn unique_id(&self) -> String {
        match self.partition {
            Some(p) => format!("{}:{}:{}", self.kind, self.fitting_name, p),
            None => format!("{}:{}", self.kind, self.fitting_name),
        }
    }
}
