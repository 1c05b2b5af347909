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

//! Definition of the [`FittingBehavior`] trait: the callback set a stage
//! implementation provides (spec.md §4.2), and the [`BehaviorRegistry`] that
//! resolves a fitting's `behavior_id` to a factory at pipeline-build time
//! (spec.md §9, "dynamic dispatch over stage behaviors").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pipeflow_context::Context;
use pipeflow_proto::{EffectHandler, PartitionId};
use serde_yaml::Value;

/// All the errors that can occur while resolving or running a behavior.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No factory is registered under this behavior identifier.
    #[error("unknown behavior (behavior_id: {behavior_id})")]
    UnknownBehavior {
        /// The identifier that was looked up.
        behavior_id: String,
    },

    /// `validate_arg` rejected the fitting's configuration.
    #[error("invalid fitting configuration (behavior_id: {behavior_id}, reason: {reason})")]
    InvalidConfig {
        /// The behavior that rejected the configuration.
        behavior_id: String,
        /// The reason given by `validate_arg`.
        reason: String,
    },

    /// `init` failed.
    #[error("behavior init failed (behavior_id: {behavior_id}, reason: {reason})")]
    InitFailed {
        /// The behavior whose `init` failed.
        behavior_id: String,
        /// The reason given.
        reason: String,
    },
}

/// The result of a `process` call (spec.md §4.2).
#[derive(Debug, Clone)]
pub enum Verdict {
    /// The input was handled successfully.
    Ok,
    /// The input should be forwarded to the next entry in its preflist.
    ForwardPreflist,
    /// The input failed; `reason` is surfaced as a `result`-kind log record.
    Error(String),
}

/// The callback set a stage implementation provides to its workers.
///
/// Mirrors `beaubourg`'s `AsyncProcessor`: behaviors are boxed trait objects
/// holding their own mutable state rather than threading a generic state
/// type through the trait, so a [`BehaviorFactory`] can return
/// `Box<dyn FittingBehavior<Msg>>` uniformly regardless of what a particular
/// stage keeps in memory.
#[async_trait]
pub trait FittingBehavior<Msg: 'static + Clone + Send>: Send {
    /// Called once before the first `process` call. Failure is fatal to the
    /// worker (spec.md §4.2).
    async fn init(&mut self, _partition: PartitionId, _context: &Context) -> Result<(), Error> {
        Ok(())
    }

    /// Handles one dequeued input. `last_preflist` is true iff this input's
    /// remaining preflist has length one.
    async fn process(&mut self, input: Msg, last_preflist: bool, effects: &EffectHandler<Msg>) -> Verdict;

    /// Called once after the worker's final input (post-EOI drain) or before
    /// a handoff archive. Behaviors that buffer state until end-of-input
    /// (e.g. a reducer) emit their final outputs here.
    async fn done(&mut self, _effects: &EffectHandler<Msg>) {}

    /// Validates a fitting's static `arg` before the pipeline is built
    /// (spec.md §4.4 step 1). Most behaviors accept anything.
    fn validate_arg(&self, _arg: &Value) -> Result<(), Error> {
        Ok(())
    }

    /// Serializes this behavior's state for a handoff to another node.
    /// Returns `None` if this behavior doesn't support handoff.
    fn archive(&self) -> Option<Value> {
        None
    }

    /// Restores state from a handoff archive before the first `process` call
    /// on the destination node.
    async fn handoff(&mut self, _archive: Value) {}
}

/// Creates behavior instances for a given `behavior_id`. One factory per
/// behavior kind, registered in a [`BehaviorRegistry`].
pub trait BehaviorFactory<Msg: 'static + Clone + Send>: Send + Sync {
    /// Builds a fresh, uninitialized behavior instance from `arg`.
    fn create(&self, arg: Value) -> Result<Box<dyn FittingBehavior<Msg> + Send>, Error>;
}

/// Resolves a fitting's `behavior_id` to a [`BehaviorFactory`]. Populated
/// once at startup with every behavior a deployment supports, then consulted
/// read-only at pipeline-build time (spec.md §9).
#[derive(Clone)]
pub struct BehaviorRegistry<Msg: 'static + Clone + Send> {
    factories: Arc<HashMap<String, Arc<dyn BehaviorFactory<Msg>>>>,
}

impl<Msg: 'static + Clone + Send> BehaviorRegistry<Msg> {
    /// Builds a registry from a set of `(behavior_id, factory)` pairs.
    pub fn new(factories: impl IntoIterator<Item = (String, Arc<dyn BehaviorFactory<Msg>>)>) -> Self {
        Self {
            factories: Arc::new(factories.into_iter().collect()),
        }
    }

    /// Creates a behavior instance for `behavior_id`, or `UnknownBehavior` if
    /// no factory is registered under it.
    pub fn create(&self, behavior_id: &str, arg: Value) -> Result<Box<dyn FittingBehavior<Msg> + Send>, Error> {
        let factory = self.factories.get(behavior_id).ok_or_else(|| Error::UnknownBehavior {
            behavior_id: behavior_id.to_string(),
        })?;
        factory.create(arg)
    }

    /// Validates `arg` against `behavior_id`'s factory without keeping the
    /// resulting instance, for `pipeflow-builder`'s validation step.
    pub fn validate(&self, behavior_id: &str, arg: &Value) -> Result<(), Error> {
        let instance = self.create(behavior_id, arg.clone())?;
        instance.validate_arg(arg).map_err(|error| match error {
            Error::InvalidConfig { reason, .. } => Error::InvalidConfig {
                behavior_id: behavior_id.to_string(),
                reason,
            },
            other => other,
        })
    }
}
