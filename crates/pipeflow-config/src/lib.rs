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

//! Fitting spec construction/validation and pipeline options (spec.md §3,
//! §4.4 step 1, §6). `FittingSpecConfig` is the declarative shape a caller
//! can deserialize; [`build_spec`] turns it into the immutable
//! `pipeflow_proto::FittingSpec` a builder spawns a coordinator with, after
//! running both the structural checks below and the behavior's own
//! `validate_arg`.

use std::sync::Arc;

use serde::Deserialize;
use validator::Validate;

use pipeflow_behavior::BehaviorRegistry;
use pipeflow_context::{LogMode, TraceFilter};
use pipeflow_proto::{FittingSpec, Partitioner, SinkHandle};

/// Errors building a fitting spec or resolving pipeline options.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A structural check on `FittingSpecConfig` failed.
    #[error("invalid fitting spec (name: {name}, reason: {reason})")]
    InvalidShape {
        /// The fitting's declared name.
        name: String,
        /// The validator-reported reason.
        reason: String,
    },

    /// The behavior's own `validate_arg` rejected the fitting's `arg`.
    #[error(transparent)]
    InvalidConfig(#[from] pipeflow_behavior::Error),
}

/// The declarative, validator-checked shape of a fitting spec (spec.md §3).
/// The partitioner is not part of this shape: it is a Rust closure supplied
/// by the caller to [`build_spec`], since a hash function over an arbitrary
/// `Msg` type has no declarative representation.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FittingSpecConfig {
    /// Human label attached to every result/log this fitting emits.
    #[validate(length(min = 1))]
    pub name: String,
    /// The identifier of the registered behavior implementing this fitting.
    #[validate(length(min = 1))]
    pub behavior_id: String,
    /// Opaque static configuration passed to the behavior's `init`.
    #[serde(default)]
    pub arg: serde_yaml::Value,
    /// Length of the preflist considered for each input.
    #[validate(range(min = 1))]
    pub nval: usize,
    /// Maximum enqueued + blocking items per worker.
    #[validate(range(min = 1))]
    pub q_limit: usize,
}

/// Validates `config`'s shape, then its `arg` against the registered
/// behavior's `validate_arg`, and builds the immutable spec a pipeline is
/// built from (spec.md §4.4 step 1).
pub fn build_spec<Msg: 'static + Clone + Send>(
    config: FittingSpecConfig,
    partitioner: Partitioner<Msg>,
    behaviors: &BehaviorRegistry<Msg>,
) -> Result<Arc<FittingSpec<Msg>>, Error> {
    config.validate().map_err(|error| Error::InvalidShape {
        name: config.name.clone(),
        reason: error.to_string(),
    })?;
    behaviors.validate(&config.behavior_id, &config.arg)?;
    tracing::debug!(name = %config.name, behavior_id = %config.behavior_id, "fitting spec validated");

    Ok(Arc::new(FittingSpec {
        name: Arc::from(config.name.as_str()),
        behavior_id: config.behavior_id,
        arg: config.arg,
        partitioner,
        nval: config.nval,
        q_limit: config.q_limit,
    }))
}

/// Where a pipeline's sink-bound records go, per `exec`'s `sink` option
/// (spec.md §6). `Undefined` means the caller itself: `pipeflow-builder`
/// opens a fresh channel via `pipeflow_sink::channel` in that case.
pub enum SinkOption<Msg> {
    /// Deliver records to an already-running sink.
    Address(SinkHandle<Msg>),
    /// No address given; the caller is the sink.
    Undefined,
}

/// Options recognized by `exec` (spec.md §6).
pub struct PipelineOptions<Msg> {
    /// Where result/log/end-of-input records go.
    pub sink: SinkOption<Msg>,
    /// Where log records are delivered.
    pub log: LogMode,
    /// Which trace topics are kept.
    pub trace: TraceFilter,
}

impl<Msg> Default for PipelineOptions<Msg> {
    fn default() -> Self {
        Self {
            sink: SinkOption::Undefined,
            log: LogMode::Drop,
            trace: TraceFilter::Drop,
        }
    }
}
