//! The per-(fitting, partition) state a queue manager owns (spec.md §3).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use pipeflow_proto::{EnqueueOutcome, Envelope, FittingDetails, WorkerState};
use tokio::sync::oneshot;

use pipeflow_signal::WorkSignal;

/// A blocking sender: an accepted-or-rejected reply parked until `ready` has
/// room (spec.md §3 invariant 3).
pub(crate) struct Blocked<Msg> {
    pub(crate) reply: oneshot::Sender<EnqueueOutcome>,
    pub(crate) envelope: Envelope<Msg>,
}

/// State for one (fitting, partition) queue (spec.md §3).
pub(crate) struct QueueRecord<Msg> {
    pub(crate) details: Option<Arc<FittingDetails<Msg>>>,
    pub(crate) requesting_details: bool,
    pub(crate) ready: VecDeque<Envelope<Msg>>,
    pub(crate) blocking: VecDeque<Blocked<Msg>>,
    pub(crate) waiting_reply: Option<oneshot::Sender<WorkSignal<Msg>>>,
    pub(crate) in_flight: Option<Envelope<Msg>>,
    pub(crate) has_worker: bool,
    pub(crate) restart_attempted: bool,
    pub(crate) forwarding: bool,
    pub(crate) eoi_received: bool,
    pub(crate) state: WorkerState,
    pub(crate) started: Instant,
    pub(crate) processed: u64,
    pub(crate) failures: u64,
}

impl<Msg> QueueRecord<Msg> {
    pub(crate) fn new() -> Self {
        Self {
            details: None,
            requesting_details: false,
            ready: VecDeque::new(),
            blocking: VecDeque::new(),
            waiting_reply: None,
            in_flight: None,
            has_worker: false,
            restart_attempted: false,
            forwarding: false,
            eoi_received: false,
            state: WorkerState::Init,
            started: Instant::now(),
            processed: 0,
            failures: 0,
        }
    }

    /// Whether this record has no more work to do and can be reclaimed
    /// (spec.md §3's queue lifecycle).
    pub(crate) fn is_drained(&self) -> bool {
        self.eoi_received && self.ready.is_empty() && self.blocking.is_empty() && self.in_flight.is_none()
    }

    pub(crate) fn effective_limit(&self, node_wide_limit: usize) -> usize {
        self.details.as_ref().map_or(node_wide_limit, |details| details.spec.q_limit.min(node_wide_limit))
    }
}
