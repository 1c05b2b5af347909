//! Runs spec.md §8's S1 scenario end to end: a single-stage identity
//! pipeline on a two-node cluster, fed ten inputs, closed, and drained.

use std::sync::Arc;

use pipeflow::{build_spec, BehaviorFactory, BehaviorRegistry, Cluster, FittingSpecConfig, Partitioner, PassFactory, PipelineOptions};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let behaviors: BehaviorRegistry<String> = BehaviorRegistry::new([(
        "pass".to_string(),
        Arc::new(PassFactory) as Arc<dyn BehaviorFactory<String>>,
    )]);

    let cluster = Cluster::spawn(&["node-a", "node-b"], 4, 16, 1024, behaviors.clone());

    let config = FittingSpecConfig {
        name: "echo".to_string(),
        behavior_id: "pass".to_string(),
        arg: serde_yaml::Value::Null,
        nval: 2,
        q_limit: 64,
    };
    let spec = build_spec(config, Partitioner::Hash(Arc::new(|value: &String| value.len() as u64)), &behaviors).expect("valid spec");

    let handle = pipeflow::exec(vec![spec], PipelineOptions::default()).expect("pipeline should build");

    for i in 0..10 {
        let outcome = pipeflow::queue_work(&cluster, &handle, format!("message-{i}")).await;
        tracing::info!(?outcome, i, "queued");
    }

    pipeflow::eoi(&handle).await;

    let (results, logs) = pipeflow::collect_results(&handle).await;
    tracing::info!(count = results.len(), log_count = logs.len(), "pipeline drained");
    for (value, from) in &results {
        println!("{from}: {value}");
    }

    handle.joined().await;
}
