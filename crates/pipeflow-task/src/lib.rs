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

//! Bookkeeping for the long-lived actors a node hosts: workers, coordinators,
//! and queue managers. A [`TaskManager`] tracks their join handles so a node
//! can wait for a clean shutdown.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::error;

use crate::labels::{ActorLabels, NodeLabels};

pub mod labels;

/// All the errors of this crate. `TaskManager` has none today; kept for
/// the crate's error-enum convention so callers don't need to change when
/// one is added.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {}

/// A join handle for a tracked actor.
pub type JoinHandleTask = JoinHandle<Box<dyn ActorCleaner>>;

/// A trait for actors that need to run cleanup once their task completes.
#[async_trait]
pub trait ActorCleaner: std::fmt::Debug + Send {
    /// Called once the actor's task has returned.
    async fn cleanup(&self);
}

/// Tracks the long-lived actors spawned on a node.
#[derive(Clone, Default)]
#[must_use]
pub struct TaskManager {
    node_labels: NodeLabels,
    registered: Arc<AsyncMutex<FuturesUnordered<JoinHandleTask>>>,
    pending: Arc<Mutex<Vec<JoinHandleTask>>>,
}

impl TaskManager {
    /// Creates a new task manager for the given node.
    pub fn new(node_labels: NodeLabels) -> Self {
        Self {
            node_labels,
            registered: Arc::new(AsyncMutex::new(FuturesUnordered::new())),
            pending: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Returns the node labels this manager was created with.
    pub fn node_labels(&self) -> NodeLabels {
        self.node_labels.clone()
    }

    /// Registers a newly spawned actor's join handle.
    pub fn register(&self, join_handle: JoinHandleTask, actor_labels: &ActorLabels) {
        if let Ok(queue) = self.registered.try_lock() {
            queue.push(join_handle);
        } else {
            self.pending
                .lock()
                .expect("pending registrations lock poisoned")
                .push(join_handle);
        }

        tracing::info!(
            node_id = %self.node_labels.node_id,
            actor = %actor_labels.unique_id(),
            "actor registered and started"
        );
    }

    /// Waits for every registered actor to finish, running its cleanup hook
    /// as it does.
    pub async fn join(&self) {
        let actor_count = self.registered.lock().await.len();
        tracing::info!(
            node_id = %self.node_labels.node_id,
            actor_count = %actor_count,
            "joining registered actors"
        );

        while let Some(item) = self.registered.lock().await.next().await {
            match item {
                Err(err) => error!(?err, "actor join error"),
                Ok(cleaner) => cleaner.cleanup().await,
            }

            let pending_handles: Vec<_> = self
                .pending
                .lock()
                .expect("pending lock poisoned")
                .drain(..)
                .collect();
            for join_handle in pending_handles {
                self.registered.lock().await.push(join_handle);
            }
        }
    }

    /// Returns a cleaner that performs no work, for actors with nothing to
    /// release on exit.
    pub fn no_op_cleaner(node_labels: NodeLabels, actor_labels: ActorLabels) -> Box<dyn ActorCleaner> {
        Box::new(NoOpCleaner { node_labels, actor_labels })
    }
}

/// A cleaner that performs no work.
#[derive(Debug)]
pub struct NoOpCleaner {
    node_labels: NodeLabels,
    actor_labels: ActorLabels,
}

#[async_trait]
impl ActorCleaner for NoOpCleaner {
    async fn cleanup(&self) {
        tracing::trace!(
            node_id = %self.node_labels.node_id,
            actor = %self.actor_labels.unique_id(),
            "actor cleaned up"
        );
    }
}
