//! The queue manager's address and mailbox protocol (spec.md §4.1).

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::records::{EnqueueOutcome, WorkerStatus};
use crate::spec::FittingDetails;
use crate::{Envelope, PartitionId};
use pipeflow_signal::WorkSignal;

/// A message sent to a queue manager's mailbox.
pub enum QueueManagerMsg<Msg> {
    /// Enqueue an input, replying once it is durably in `ready` or rejected.
    Enqueue {
        /// The input envelope.
        envelope: Envelope<Msg>,
        /// Where to send the outcome.
        reply: oneshot::Sender<EnqueueOutcome>,
    },
    /// A worker asking for its next input.
    WorkerDequeue {
        /// The fitting this worker serves.
        fitting: Arc<str>,
        /// The partition this worker serves.
        partition: PartitionId,
        /// Where to send the next signal.
        reply: oneshot::Sender<WorkSignal<Msg>>,
    },
    /// The coordinator's reply to a spec lookup, delivered once.
    DeliverDetails {
        /// The fitting these details describe.
        fitting: Arc<str>,
        /// The partition this queue serves.
        partition: PartitionId,
        /// The resolved fitting details.
        details: Arc<FittingDetails<Msg>>,
    },
    /// No more inputs are coming for this fitting.
    MarkEoi {
        /// The fitting to mark.
        fitting: Arc<str>,
    },
    /// A worker finished its post-EOI drain and exited cleanly.
    WorkerDone {
        /// The fitting the worker served.
        fitting: Arc<str>,
        /// The partition the worker served.
        partition: PartitionId,
    },
    /// A worker's monitor fired.
    WorkerCrashed {
        /// The fitting the worker served.
        fitting: Arc<str>,
        /// The partition the worker served.
        partition: PartitionId,
        /// Why the worker terminated.
        reason: String,
        /// Whether the worker already emitted its own log record for this
        /// termination (an `exception`, for a caught stage-callback panic)
        /// before reporting the crash, so the manager doesn't also log it
        /// as `unreachable_worker`.
        already_logged: bool,
    },
    /// A worker asked to forward the input it currently has in hand to the
    /// next preflist entry, rather than completing it.
    ForwardCurrent {
        /// The fitting the worker serves.
        fitting: Arc<str>,
        /// The partition the worker serves.
        partition: PartitionId,
    },
    /// A worker finished handling its current input with an `ok` or
    /// `error(reason)` verdict (not a forward), for status counters.
    Completed {
        /// The fitting the worker serves.
        fitting: Arc<str>,
        /// The partition the worker serves.
        partition: PartitionId,
        /// Whether the verdict was `ok` (`false` for `error(reason)`).
        ok: bool,
    },
    /// A best-effort status query for every worker of a fitting on this
    /// node.
    Status {
        /// The fitting to report on.
        fitting: Arc<str>,
        /// Where to send the snapshot.
        reply: oneshot::Sender<Vec<WorkerStatus>>,
    },
}

/// A cloneable address for a node's queue manager.
pub struct QueueManagerHandle<Msg> {
    tx: mpsc::Sender<QueueManagerMsg<Msg>>,
    /// The node this queue manager runs on, for logging and status.
    pub node_id: Arc<str>,
}

// Manual impl: `#[derive(Clone)]` would add a spurious `Msg: Clone` bound,
// but `mpsc::Sender` and `Arc<str>` are cloneable regardless of `Msg`.
impl<Msg> Clone for QueueManagerHandle<Msg> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone(), node_id: self.node_id.clone() }
    }
}

/// The mailbox was closed; the queue manager's task has exited.
#[derive(thiserror::Error, Debug, Clone)]
#[error("queue manager mailbox closed (node: {node_id})")]
pub struct MailboxClosed {
    /// The node whose mailbox was closed.
    pub node_id: String,
}

impl<Msg> QueueManagerHandle<Msg> {
    /// Wraps a raw sender into a handle. Used by `pipeflow-queue`'s actor
    /// constructor; other crates never build a handle by hand.
    pub fn from_sender(node_id: impl Into<Arc<str>>, tx: mpsc::Sender<QueueManagerMsg<Msg>>) -> Self {
        Self { tx, node_id: node_id.into() }
    }

    async fn send(&self, msg: QueueManagerMsg<Msg>) -> Result<(), MailboxClosed> {
        self.tx.send(msg).await.map_err(|_| MailboxClosed {
            node_id: self.node_id.to_string(),
        })
    }

    /// Synchronous-from-the-caller's-perspective enqueue: resolves once the
    /// input sits in `ready` or is rejected (spec.md §4.1).
    pub async fn enqueue(&self, envelope: Envelope<Msg>) -> EnqueueOutcome {
        let (reply, rx) = oneshot::channel();
        if self.send(QueueManagerMsg::Enqueue { envelope, reply }).await.is_err() {
            return EnqueueOutcome::Rejected(crate::records::RejectReason::UnknownFitting);
        }
        rx.await
            .unwrap_or(EnqueueOutcome::Rejected(crate::records::RejectReason::UnknownFitting))
    }

    /// Asks for the next input for `(fitting, partition)`, parking until one
    /// arrives or end-of-input is observed.
    pub async fn worker_dequeue(&self, fitting: Arc<str>, partition: PartitionId) -> WorkSignal<Msg> {
        let (reply, rx) = oneshot::channel();
        if self
            .send(QueueManagerMsg::WorkerDequeue { fitting, partition, reply })
            .await
            .is_err()
        {
            return WorkSignal::Stop;
        }
        rx.await.unwrap_or(WorkSignal::Stop)
    }

    /// Delivers the spec lookup response for `(fitting, partition)`.
    pub async fn deliver_details(&self, fitting: Arc<str>, partition: PartitionId, details: Arc<FittingDetails<Msg>>) {
        let _ = self.send(QueueManagerMsg::DeliverDetails { fitting, partition, details }).await;
    }

    /// Marks a fitting's queues as closed to new input.
    pub async fn mark_eoi(&self, fitting: Arc<str>) {
        let _ = self.send(QueueManagerMsg::MarkEoi { fitting }).await;
    }

    /// Reports that a worker finished its post-EOI drain.
    pub async fn worker_done(&self, fitting: Arc<str>, partition: PartitionId) {
        let _ = self.send(QueueManagerMsg::WorkerDone { fitting, partition }).await;
    }

    /// Reports that a worker's monitor fired. `already_logged` is `true`
    /// when the caller already emitted an `exception` log record for this
    /// termination (a caught stage-callback panic or an `init`/`create`
    /// failure), so the manager's crash handler skips its own
    /// `unreachable_worker` log for a termination the stage already
    /// explained (spec.md §7).
    pub async fn worker_crashed(&self, fitting: Arc<str>, partition: PartitionId, reason: String, already_logged: bool) {
        let _ = self
            .send(QueueManagerMsg::WorkerCrashed {
                fitting,
                partition,
                reason,
                already_logged,
            })
            .await;
    }

    /// Asks this manager to forward the input currently in hand for
    /// `(fitting, partition)` to the next preflist entry, instead of
    /// completing it normally.
    pub async fn forward_current(&self, fitting: Arc<str>, partition: PartitionId) {
        let _ = self.send(QueueManagerMsg::ForwardCurrent { fitting, partition }).await;
    }

    /// Reports that a worker finished its current input with an `ok` or
    /// `error(reason)` verdict, for status counters.
    pub async fn completed(&self, fitting: Arc<str>, partition: PartitionId, ok: bool) {
        let _ = self.send(QueueManagerMsg::Completed { fitting, partition, ok }).await;
    }

    /// Returns a best-effort status snapshot for every worker of `fitting`
    /// on this node.
    pub async fn status(&self, fitting: Arc<str>) -> Vec<WorkerStatus> {
        let (reply, rx) = oneshot::channel();
        if self.send(QueueManagerMsg::Status { fitting, reply }).await.is_err() {
            return vec![];
        }
        rx.await.unwrap_or_default()
    }
}
