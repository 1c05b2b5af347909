//! The coordinator's address and mailbox protocol (spec.md §4.3).

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::queue_manager::QueueManagerHandle;
use crate::records::CoordinatorStatus;
use crate::spec::FittingDetails;
use crate::PartitionId;

/// A message sent to a coordinator's mailbox.
pub enum CoordinatorMsg<Msg> {
    /// A queue manager resolving the spec for a partition it just received
    /// an input for. Registers the caller in `W`.
    GetDetails {
        /// The queue manager asking.
        caller: QueueManagerHandle<Msg>,
        /// The partition the caller is asking on behalf of.
        partition: PartitionId,
        /// Where to send the resolved details.
        reply: oneshot::Sender<Arc<FittingDetails<Msg>>>,
    },
    /// A worker finished its post-EOI drain.
    WorkerDone {
        /// The partition that drained.
        partition: PartitionId,
    },
    /// A worker's monitor fired; treated identically to `WorkerDone`.
    WorkerDown {
        /// The partition that went down.
        partition: PartitionId,
    },
    /// The client requested end-of-input for this pipeline.
    ClientEoi,
    /// A best-effort status query.
    Status {
        /// Where to send the status.
        reply: oneshot::Sender<CoordinatorStatus<Msg>>,
    },
}

/// A cloneable address for a fitting's coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle<Msg> {
    tx: mpsc::Sender<CoordinatorMsg<Msg>>,
}

impl<Msg> CoordinatorHandle<Msg> {
    /// Wraps a raw sender into a handle. Used by `pipeflow-coordinator`'s
    /// actor constructor.
    pub fn from_sender(tx: mpsc::Sender<CoordinatorMsg<Msg>>) -> Self {
        Self { tx }
    }

    /// Asks this coordinator for the fitting's details, registering `caller`
    /// as an active worker source.
    pub async fn get_details(
        &self,
        caller: QueueManagerHandle<Msg>,
        partition: PartitionId,
    ) -> Option<Arc<FittingDetails<Msg>>> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(CoordinatorMsg::GetDetails { caller, partition, reply })
            .await
            .is_err()
        {
            return None;
        }
        rx.await.ok()
    }

    /// Reports that a worker finished its post-EOI drain.
    pub async fn worker_done(&self, partition: PartitionId) {
        let _ = self.tx.send(CoordinatorMsg::WorkerDone { partition }).await;
    }

    /// Reports that a worker's monitor fired.
    pub async fn worker_down(&self, partition: PartitionId) {
        let _ = self.tx.send(CoordinatorMsg::WorkerDown { partition }).await;
    }

    /// Requests end-of-input for this fitting.
    pub async fn client_eoi(&self) {
        let _ = self.tx.send(CoordinatorMsg::ClientEoi).await;
    }

    /// Returns a best-effort status snapshot.
    pub async fn status(&self) -> Option<CoordinatorStatus<Msg>> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(CoordinatorMsg::Status { reply }).await.is_err() {
            return None;
        }
        rx.await.ok()
    }
}
