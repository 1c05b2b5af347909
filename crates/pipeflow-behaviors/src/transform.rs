//! The `transform` behavior: applies a fixed function to every input.

use std::sync::Arc;

use async_trait::async_trait;
use pipeflow_behavior::{BehaviorFactory, Error, FittingBehavior, Verdict};
use pipeflow_proto::EffectHandler;
use serde_yaml::Value;

use crate::sample::Sample;

/// Applies a function to every input and forwards the result. The function
/// itself is fixed at registration time: a fitting's static `arg` carries
/// only data, not code, so distinct transforms are registered under distinct
/// behavior identifiers (spec.md §9's registry, resolved per identifier).
pub struct Transform {
    apply: Arc<dyn Fn(Sample) -> Sample + Send + Sync>,
}

#[async_trait]
impl FittingBehavior<Sample> for Transform {
    async fn process(&mut self, input: Sample, _last_preflist: bool, effects: &EffectHandler<Sample>) -> Verdict {
        effects.send_output((self.apply)(input)).await;
        Verdict::Ok
    }
}

/// Builds [`Transform`] instances that all apply the same function.
pub struct TransformFactory {
    apply: Arc<dyn Fn(Sample) -> Sample + Send + Sync>,
}

impl TransformFactory {
    /// Registers a transform under a behavior identifier with the function
    /// it should apply.
    pub fn new(apply: impl Fn(Sample) -> Sample + Send + Sync + 'static) -> Self {
        Self { apply: Arc::new(apply) }
    }
}

impl BehaviorFactory<Sample> for TransformFactory {
    fn create(&self, _arg: Value) -> Result<Box<dyn FittingBehavior<Sample> + Send>, Error> {
        Ok(Box::new(Transform { apply: self.apply.clone() }))
    }
}
