//! The input envelope carried on the wire between queue managers
//! (spec.md §3).

use std::sync::Arc;

use crate::handles::CoordinatorHandle;
use crate::{PartitionId, PipelineRef};

/// An input envelope: everything a queue manager needs to accept, process,
/// and (if necessary) forward an input, without consulting anything else.
#[derive(Clone)]
pub struct Envelope<Msg> {
    /// The pipeline this input belongs to.
    pub pipeline_ref: PipelineRef,
    /// The coordinator for the fitting this input targets.
    pub coordinator: CoordinatorHandle<Msg>,
    /// The name of the target fitting.
    pub fitting_name: Arc<str>,
    /// The partition that produced this input, if any (required when the
    /// next fitting's partitioner is `follow`; spec.md §3 invariant 6).
    pub source_partition: Option<PartitionId>,
    /// The input value.
    pub value: Msg,
    /// The remaining preflist for this input, head-first. The current
    /// target partition is `preflist_remaining[0]`.
    pub preflist_remaining: Vec<PartitionId>,
}

impl<Msg> Envelope<Msg> {
    /// True iff this input is on the last preflist position it will ever be
    /// tried on.
    pub fn last_preflist(&self) -> bool {
        self.preflist_remaining.len() == 1
    }

    /// The partition this envelope currently targets.
    pub fn target_partition(&self) -> Option<PartitionId> {
        self.preflist_remaining.first().copied()
    }

    /// Consumes this envelope's head partition, returning a new envelope
    /// targeting the next preflist entry, or `None` if the preflist is
    /// exhausted.
    pub fn advance_preflist(mut self) -> Option<Self> {
        if self.preflist_remaining.len() <= 1 {
            return None;
        }
        let _ = self.preflist_remaining.remove(0);
        Some(self)
    }
}
