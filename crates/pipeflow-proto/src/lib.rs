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

//! Wire types and addressable actor handles shared by every pipeflow
//! component: [`Envelope`] (spec.md §3), [`FittingSpec`]/[`FittingDetails`],
//! the sink records, and the `QueueManagerHandle`/`CoordinatorHandle`/
//! `SinkHandle` addresses actors exchange messages through (spec.md §9's
//! "addressable processes" design note).

pub use pipeflow_ring::{hash_value, HashValue, NodeId, PartitionId, PreflistEntry, RingClient};

pub mod effect;
pub mod envelope;
pub mod handles;
pub mod records;
pub mod spec;

pub use effect::{EffectHandler, OutputSink, RouterError};
pub use envelope::Envelope;
pub use handles::{CoordinatorHandle, CoordinatorMsg, QueueManagerHandle, QueueManagerMsg, SinkHandle};
pub use records::{CoordinatorState, CoordinatorStatus, EnqueueOutcome, LogKind, RejectReason, SinkRecord, WorkerState, WorkerStatus};
pub use spec::{FittingDetails, FittingSpec, NextStage, Partitioner};

/// A unique reference for one `exec` invocation, carried on every artifact it
/// produces (spec.md §3 invariant 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineRef(uuid::Uuid);

impl PipelineRef {
    /// Allocates a fresh pipeline reference.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for PipelineRef {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PipelineRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
