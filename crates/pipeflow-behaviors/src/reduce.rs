//! The `reduce` behavior: a keyed reducer summing integers under each key,
//! emitting one output per key on end-of-input (spec.md §8's S3 scenario).

use std::collections::HashMap;

use async_trait::async_trait;
use pipeflow_behavior::{BehaviorFactory, Error, FittingBehavior, Verdict};
use pipeflow_proto::EffectHandler;
use serde_yaml::Value;

use crate::sample::Sample;

/// Sums `Sample::Keyed` inputs by key, emitting `(key, total)` for every key
/// it has seen once `done` is called. Non-keyed inputs are rejected with an
/// `error(reason)` verdict rather than silently dropped.
#[derive(Default)]
pub struct Reduce {
    totals: HashMap<String, i64>,
}

#[async_trait]
impl FittingBehavior<Sample> for Reduce {
    async fn process(&mut self, input: Sample, _last_preflist: bool, _effects: &EffectHandler<Sample>) -> Verdict {
        match input {
            Sample::Keyed(key, value) => {
                let total = self.totals.entry(key).or_insert(0);
                *total += value;
                Verdict::Ok
            }
            other => Verdict::Error(format!("reduce requires Sample::Keyed inputs, got {other:?}")),
        }
    }

    async fn done(&mut self, effects: &EffectHandler<Sample>) {
        // process() never emits; everything is flushed here, once, after
        // the worker's drain loop has seen end-of-input.
        for (key, total) in self.totals.drain() {
            effects.send_output(Sample::Keyed(key, total)).await;
        }
    }
}

/// Builds [`Reduce`] instances. `arg` is ignored.
pub struct ReduceFactory;

impl BehaviorFactory<Sample> for ReduceFactory {
    fn create(&self, _arg: Value) -> Result<Box<dyn FittingBehavior<Sample> + Send>, Error> {
        Ok(Box::new(Reduce::default()))
    }
}
