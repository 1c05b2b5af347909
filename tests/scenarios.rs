//! End-to-end scenarios against the in-process cluster harness, covering
//! spec.md §8's S1 (identity), S2 (back-pressure), S3 (reduce), S4 (preflist
//! forward), S5 (forward exhaustion), and S6 (exception recovery) cases.

use std::sync::Arc;

use pipeflow::{build_spec, BehaviorFactory, BehaviorRegistry, Cluster, FittingSpecConfig, Partitioner, PassFactory, PipelineOptions};

#[tokio::test]
async fn s1_identity_pipeline_echoes_inputs_in_order_then_closes() {
    let behaviors: BehaviorRegistry<String> = BehaviorRegistry::new([(
        "pass".to_string(),
        Arc::new(PassFactory) as Arc<dyn BehaviorFactory<String>>,
    )]);
    let cluster = Cluster::spawn(&["node-a"], 1, 8, 64, behaviors.clone());

    let config = FittingSpecConfig {
        name: "pass".to_string(),
        behavior_id: "pass".to_string(),
        arg: serde_yaml::Value::Null,
        nval: 1,
        q_limit: 64,
    };
    let spec = build_spec(config, Partitioner::Hash(Arc::new(|_: &String| 0)), &behaviors).expect("valid spec");
    let handle = pipeflow::exec(vec![spec], PipelineOptions::default()).expect("should build");

    for value in ["a", "b", "c"] {
        let outcome = pipeflow::queue_work(&cluster, &handle, value.to_string()).await;
        assert_eq!(outcome, pipeflow::EnqueueOutcome::Accepted);
    }
    pipeflow::eoi(&handle).await;

    let (results, logs) = pipeflow::collect_results(&handle).await;
    assert!(logs.is_empty());
    assert_eq!(
        results,
        vec![
            ("a".to_string(), Arc::from("pass")),
            ("b".to_string(), Arc::from("pass")),
            ("c".to_string(), Arc::from("pass")),
        ]
    );
}

mod reduce {
    use std::sync::Arc;

    use pipeflow::{build_spec, BehaviorFactory, BehaviorRegistry, Cluster, FittingSpecConfig, Partitioner, PipelineOptions, ReduceFactory};
    use pipeflow_behaviors::Sample;

    #[tokio::test]
    async fn s3_reduce_sums_by_key_and_emits_once_per_key_on_eoi() {
        let behaviors: BehaviorRegistry<Sample> = BehaviorRegistry::new([(
            "reduce".to_string(),
            Arc::new(ReduceFactory) as Arc<dyn BehaviorFactory<Sample>>,
        )]);
        let cluster = Cluster::spawn(&["node-a"], 1, 8, 64, behaviors.clone());

        let config = FittingSpecConfig {
            name: "totals".to_string(),
            behavior_id: "reduce".to_string(),
            arg: serde_yaml::Value::Null,
            nval: 1,
            q_limit: 64,
        };
        let spec = build_spec(config, Partitioner::Hash(Arc::new(|_: &Sample| 0)), &behaviors).expect("valid spec");
        let handle = pipeflow::exec(vec![spec], PipelineOptions::default()).expect("should build");

        for input in [
            Sample::Keyed("a".to_string(), 1),
            Sample::Keyed("b".to_string(), 2),
            Sample::Keyed("a".to_string(), 3),
            Sample::Keyed("b".to_string(), 4),
        ] {
            let _ = pipeflow::queue_work(&cluster, &handle, input).await;
        }
        pipeflow::eoi(&handle).await;

        let (mut results, logs) = pipeflow::collect_results(&handle).await;
        assert!(logs.is_empty());
        results.sort_by(|a, b| format!("{:?}", a.0).cmp(&format!("{:?}", b.0)));
        assert_eq!(
            results,
            vec![
                (Sample::Keyed("a".to_string(), 4), Arc::from("totals")),
                (Sample::Keyed("b".to_string(), 6), Arc::from("totals")),
            ]
        );
    }
}

mod back_pressure {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use pipeflow::{
        build_spec, BehaviorError, BehaviorFactory, BehaviorRegistry, Cluster, EnqueueOutcome, FittingBehavior, FittingSpecConfig,
        Partitioner, PassFactory, PipelineOptions, Verdict,
    };
    use pipeflow_proto::EffectHandler;

    /// Sleeps 100ms before forwarding, standing in for a slow downstream
    /// stage so a fast upstream producer backs up behind it.
    struct Sleepy;

    #[async_trait]
    impl FittingBehavior<String> for Sleepy {
        async fn process(&mut self, input: String, _last_preflist: bool, effects: &EffectHandler<String>) -> Verdict {
            tokio::time::sleep(Duration::from_millis(100)).await;
            effects.send_output(input).await;
            Verdict::Ok
        }
    }

    struct SleepyFactory;

    impl BehaviorFactory<String> for SleepyFactory {
        fn create(&self, _arg: serde_yaml::Value) -> Result<Box<dyn FittingBehavior<String> + Send>, BehaviorError> {
            Ok(Box::new(Sleepy))
        }
    }

    #[tokio::test]
    async fn s2_backpressure_on_a_slow_stage_serializes_without_dropping_inputs() {
        let behaviors: BehaviorRegistry<String> = BehaviorRegistry::new([
            ("pass".to_string(), Arc::new(PassFactory) as Arc<dyn BehaviorFactory<String>>),
            ("sleepy".to_string(), Arc::new(SleepyFactory) as Arc<dyn BehaviorFactory<String>>),
        ]);
        let cluster = Cluster::spawn(&["node-a"], 1, 8, 256, behaviors.clone());

        let head_config = FittingSpecConfig {
            name: "fast".to_string(),
            behavior_id: "pass".to_string(),
            arg: serde_yaml::Value::Null,
            nval: 1,
            q_limit: 64,
        };
        let tail_config = FittingSpecConfig {
            name: "slow".to_string(),
            behavior_id: "sleepy".to_string(),
            arg: serde_yaml::Value::Null,
            nval: 1,
            q_limit: 2,
        };
        let head = build_spec(head_config, Partitioner::Hash(Arc::new(|_: &String| 0)), &behaviors).expect("valid spec");
        let tail = build_spec(tail_config, Partitioner::Hash(Arc::new(|_: &String| 0)), &behaviors).expect("valid spec");
        let handle = pipeflow::exec(vec![head, tail], PipelineOptions::default()).expect("should build");

        let start = Instant::now();
        for i in 0..10 {
            let outcome = pipeflow::queue_work(&cluster, &handle, i.to_string()).await;
            assert_eq!(outcome, EnqueueOutcome::Accepted);
        }
        pipeflow::eoi(&handle).await;

        let (results, logs) = pipeflow::collect_results(&handle).await;
        assert!(logs.is_empty(), "expected no drops, got logs: {logs:?}");
        assert_eq!(results.len(), 10);

        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(900),
            "expected the slow stage to serialize all 10 inputs at ~100ms each, took {elapsed:?}"
        );
    }
}

mod preflist_forward {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use pipeflow::{
        build_spec, BehaviorError, BehaviorFactory, BehaviorRegistry, Cluster, EnqueueOutcome, FittingBehavior, FittingSpecConfig,
        Partitioner, PipelineOptions, Verdict,
    };
    use pipeflow_proto::EffectHandler;

    /// Forwards on its first call, then completes normally. The counter is
    /// shared across every instance this factory creates, so a forward to a
    /// fresh worker on another partition still sees it as the "second call"
    /// (spec.md §8 S4/S5).
    struct ForwardOnce {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FittingBehavior<String> for ForwardOnce {
        async fn process(&mut self, input: String, _last_preflist: bool, effects: &EffectHandler<String>) -> Verdict {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Verdict::ForwardPreflist
            } else {
                effects.send_output(input).await;
                Verdict::Ok
            }
        }
    }

    struct ForwardOnceFactory {
        calls: Arc<AtomicUsize>,
    }

    impl BehaviorFactory<String> for ForwardOnceFactory {
        fn create(&self, _arg: serde_yaml::Value) -> Result<Box<dyn FittingBehavior<String> + Send>, BehaviorError> {
            Ok(Box::new(ForwardOnce { calls: self.calls.clone() }))
        }
    }

    #[tokio::test]
    async fn s4_preflist_forward_then_ok_produces_exactly_one_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let behaviors: BehaviorRegistry<String> = BehaviorRegistry::new([(
            "forward-once".to_string(),
            Arc::new(ForwardOnceFactory { calls: calls.clone() }) as Arc<dyn BehaviorFactory<String>>,
        )]);
        // Two nodes, one partition each: a preflist of nval=2 covers both,
        // so the forwarded attempt always lands on a real second worker.
        let cluster = Cluster::spawn(&["node-a", "node-b"], 1, 8, 64, behaviors.clone());

        let config = FittingSpecConfig {
            name: "forwarder".to_string(),
            behavior_id: "forward-once".to_string(),
            arg: serde_yaml::Value::Null,
            nval: 2,
            q_limit: 64,
        };
        let spec = build_spec(config, Partitioner::Hash(Arc::new(|_: &String| 0)), &behaviors).expect("valid spec");
        let handle = pipeflow::exec(vec![spec], PipelineOptions::default()).expect("should build");

        let outcome = pipeflow::queue_work(&cluster, &handle, "hello".to_string()).await;
        assert_eq!(outcome, EnqueueOutcome::Accepted);

        // Let the detached forward land on node-b's queue manager and
        // register with the coordinator before draining, so `eoi` doesn't
        // race the forward's own enqueue.
        tokio::time::sleep(Duration::from_millis(50)).await;
        pipeflow::eoi(&handle).await;

        let (results, logs) = pipeflow::collect_results(&handle).await;
        assert!(logs.is_empty(), "expected zero log records, got: {logs:?}");
        assert_eq!(results, vec![("hello".to_string(), Arc::from("forwarder"))]);
    }

    #[tokio::test]
    async fn s5_forward_exhaustion_with_a_single_entry_preflist_produces_no_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let behaviors: BehaviorRegistry<String> = BehaviorRegistry::new([(
            "forward-once".to_string(),
            Arc::new(ForwardOnceFactory { calls: calls.clone() }) as Arc<dyn BehaviorFactory<String>>,
        )]);
        let cluster = Cluster::spawn(&["node-a"], 1, 8, 64, behaviors.clone());

        let config = FittingSpecConfig {
            name: "forwarder".to_string(),
            behavior_id: "forward-once".to_string(),
            arg: serde_yaml::Value::Null,
            nval: 1,
            q_limit: 64,
        };
        let spec = build_spec(config, Partitioner::Hash(Arc::new(|_: &String| 0)), &behaviors).expect("valid spec");
        let handle = pipeflow::exec(vec![spec], PipelineOptions::default()).expect("should build");

        let outcome = pipeflow::queue_work(&cluster, &handle, "hello".to_string()).await;
        assert_eq!(outcome, EnqueueOutcome::Accepted);

        // Give the forward-exhaustion log time to reach the sink before
        // draining closes the pipeline out from under it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        pipeflow::eoi(&handle).await;

        let (results, logs) = pipeflow::collect_results(&handle).await;
        assert!(results.is_empty(), "expected zero results, got: {results:?}");
        assert_eq!(logs.len(), 1, "expected exactly one forward_preflist_exhausted log, got: {logs:?}");
    }
}

mod exception_recovery {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use pipeflow::{
        build_spec, BehaviorError, BehaviorFactory, BehaviorRegistry, Cluster, EnqueueOutcome, FittingBehavior, FittingSpecConfig,
        Partitioner, PipelineOptions, Verdict,
    };
    use pipeflow_proto::EffectHandler;

    /// Raises on the `crash_at`th call across every instance this factory
    /// creates, then behaves normally: models a stage whose restarted
    /// worker picks back up where the crashed one left off.
    struct CrashOnCount {
        calls: Arc<AtomicUsize>,
        crash_at: usize,
    }

    #[async_trait]
    impl FittingBehavior<String> for CrashOnCount {
        async fn process(&mut self, input: String, _last_preflist: bool, effects: &EffectHandler<String>) -> Verdict {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.crash_at {
                panic!("simulated exception on input {call}");
            }
            effects.send_output(input).await;
            Verdict::Ok
        }
    }

    struct CrashOnCountFactory {
        calls: Arc<AtomicUsize>,
        crash_at: usize,
    }

    impl BehaviorFactory<String> for CrashOnCountFactory {
        fn create(&self, _arg: serde_yaml::Value) -> Result<Box<dyn FittingBehavior<String> + Send>, BehaviorError> {
            Ok(Box::new(CrashOnCount { calls: self.calls.clone(), crash_at: self.crash_at }))
        }
    }

    #[tokio::test]
    async fn s6_worker_restarts_after_an_exception_and_finishes_the_remaining_inputs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let behaviors: BehaviorRegistry<String> = BehaviorRegistry::new([(
            "flaky".to_string(),
            Arc::new(CrashOnCountFactory { calls: calls.clone(), crash_at: 3 }) as Arc<dyn BehaviorFactory<String>>,
        )]);
        let cluster = Cluster::spawn(&["node-a"], 1, 8, 64, behaviors.clone());

        let config = FittingSpecConfig {
            name: "flaky".to_string(),
            behavior_id: "flaky".to_string(),
            arg: serde_yaml::Value::Null,
            nval: 1,
            q_limit: 64,
        };
        let spec = build_spec(config, Partitioner::Hash(Arc::new(|_: &String| 0)), &behaviors).expect("valid spec");
        let handle = pipeflow::exec(vec![spec], PipelineOptions::default()).expect("should build");

        for value in ["1", "2", "3", "4", "5"] {
            let outcome = pipeflow::queue_work(&cluster, &handle, value.to_string()).await;
            assert_eq!(outcome, EnqueueOutcome::Accepted);
        }
        pipeflow::eoi(&handle).await;

        let (results, logs) = pipeflow::collect_results(&handle).await;
        assert_eq!(logs.len(), 1, "expected exactly one exception log for input 3, got: {logs:?}");
        assert_eq!(
            results,
            vec![
                ("1".to_string(), Arc::from("flaky")),
                ("2".to_string(), Arc::from("flaky")),
                ("4".to_string(), Arc::from("flaky")),
                ("5".to_string(), Arc::from("flaky")),
            ]
        );
    }
}
