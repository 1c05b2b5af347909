//! The `pass` behavior: forwards every input unchanged.

use async_trait::async_trait;
use pipeflow_behavior::{BehaviorFactory, Error, FittingBehavior, Verdict};
use pipeflow_proto::EffectHandler;
use serde_yaml::Value;

/// Forwards its input unchanged. The identity stage used by spec.md §8's S1
/// scenario.
pub struct Pass;

#[async_trait]
impl<Msg: 'static + Clone + Send> FittingBehavior<Msg> for Pass {
    async fn process(&mut self, input: Msg, _last_preflist: bool, effects: &EffectHandler<Msg>) -> Verdict {
        effects.send_output(input).await;
        Verdict::Ok
    }
}

/// Builds [`Pass`] instances. `arg` is ignored.
pub struct PassFactory;

impl<Msg: 'static + Clone + Send> BehaviorFactory<Msg> for PassFactory {
    fn create(&self, _arg: Value) -> Result<Box<dyn FittingBehavior<Msg> + Send>, Error> {
        Ok(Box::new(Pass))
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::{effect_handler, RecordingSink};

    #[tokio::test]
    async fn pass_forwards_input_unchanged() {
        let sink = Arc::new(RecordingSink::<String>::default());
        let effects = effect_handler(sink.clone());
        let mut pass = Pass;

        let verdict = pass.process("a".to_string(), true, &effects).await;

        assert!(matches!(verdict, Verdict::Ok));
        assert_eq!(*sink.outputs.lock().unwrap(), vec!["a".to_string()]);
    }
}
