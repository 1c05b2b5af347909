//! The `tee` behavior: forwards every input unchanged while also emitting a
//! trace record for it, the way a shell `tee` duplicates a stream to a
//! side channel.

use async_trait::async_trait;
use pipeflow_behavior::{BehaviorFactory, Error, FittingBehavior, Verdict};
use pipeflow_proto::EffectHandler;
use serde_yaml::Value;

/// Forwards its input unchanged and emits a `"tee"`-topic trace record per
/// input. The trace carries no rendering of the value itself, since a
/// generic `Msg` offers no string conversion; behaviors that need to trace
/// the value's contents should build on [`crate::transform::Transform`]
/// instead.
pub struct Tee;

#[async_trait]
impl<Msg: 'static + Clone + Send> FittingBehavior<Msg> for Tee {
    async fn process(&mut self, input: Msg, _last_preflist: bool, effects: &EffectHandler<Msg>) -> Verdict {
        effects.trace(&["tee"], "tee observed an input").await;
        effects.send_output(input).await;
        Verdict::Ok
    }
}

/// Builds [`Tee`] instances. `arg` is ignored.
pub struct TeeFactory;

impl<Msg: 'static + Clone + Send> BehaviorFactory<Msg> for TeeFactory {
    fn create(&self, _arg: Value) -> Result<Box<dyn FittingBehavior<Msg> + Send>, Error> {
        Ok(Box::new(Tee))
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::{effect_handler, RecordingSink};

    #[tokio::test]
    async fn tee_forwards_input_unchanged() {
        let sink = Arc::new(RecordingSink::<i64>::default());
        let effects = effect_handler(sink.clone());
        let mut tee = Tee;

        let verdict = tee.process(7, false, &effects).await;

        assert!(matches!(verdict, Verdict::Ok));
        assert_eq!(*sink.outputs.lock().unwrap(), vec![7]);
    }
}
