//! The worker event loop: repeatedly dequeues, invokes the fitting's
//! behavior, and emits outputs (spec.md §4.2).

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use pipeflow_behavior::{BehaviorRegistry, Verdict};
use pipeflow_context::Context;
use pipeflow_proto::{EffectHandler, FittingDetails, LogKind, OutputSink, PartitionId, QueueManagerHandle, RingClient};
use pipeflow_router::{NodeDirectory, StageRouter};
use pipeflow_signal::WorkSignal;

/// Runs one worker to completion: `init`, a `process` loop driven by
/// `worker_dequeue`, and `done` once end-of-input is observed. Returns
/// normally on a clean finish; an `init`/`behavior create` failure, or a
/// panic caught from `process`, is logged as `exception` and reported to
/// the queue manager as a crash before returning (spec.md §4.2, §7) — all
/// three are callback failures the stage itself is responsible for.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_worker<Msg: 'static + Clone + Send>(
    partition: PartitionId,
    details: Arc<FittingDetails<Msg>>,
    queue_manager: QueueManagerHandle<Msg>,
    behaviors: BehaviorRegistry<Msg>,
    context: Context,
    ring: Arc<dyn RingClient>,
    nodes: Arc<dyn NodeDirectory<Msg>>,
    node_id: Arc<str>,
) {
    let fitting = details.spec.name.clone();

    let mut behavior = match behaviors.create(&details.spec.behavior_id, details.spec.arg.clone()) {
        Ok(behavior) => behavior,
        Err(error) => {
            details
                .sink
                .log(details.pipeline_ref, fitting.clone(), LogKind::Exception, error.to_string(), HashMap::new())
                .await;
            queue_manager.worker_crashed(fitting, partition, error.to_string(), true).await;
            return;
        }
    };

    let output: Arc<dyn OutputSink<Msg>> = Arc::new(StageRouter::new(
        details.pipeline_ref,
        fitting.clone(),
        details.next.clone(),
        ring,
        nodes,
        details.sink.clone(),
    ));
    let effects = EffectHandler::new(
        details.pipeline_ref,
        fitting.clone(),
        node_id,
        partition,
        output,
        details.sink.clone(),
        details.log_mode.clone(),
        details.trace_filter.clone(),
    );

    if let Err(error) = behavior.init(partition, &context).await {
        details
            .sink
            .log(details.pipeline_ref, fitting.clone(), LogKind::Exception, error.to_string(), HashMap::new())
            .await;
        queue_manager.worker_crashed(fitting, partition, error.to_string(), true).await;
        return;
    }

    loop {
        match queue_manager.worker_dequeue(fitting.clone(), partition).await {
            WorkSignal::Input { value, last_preflist } => {
                let outcome = AssertUnwindSafe(behavior.process(value, last_preflist, &effects)).catch_unwind().await;
                match outcome {
                    Ok(Verdict::Ok) => queue_manager.completed(fitting.clone(), partition, true).await,
                    Ok(Verdict::ForwardPreflist) => queue_manager.forward_current(fitting.clone(), partition).await,
                    Ok(Verdict::Error(reason)) => {
                        effects.log(LogKind::Result, reason, HashMap::new()).await;
                        queue_manager.completed(fitting.clone(), partition, false).await;
                    }
                    Err(panic) => {
                        let reason = panic_message(&panic);
                        details
                            .sink
                            .log(details.pipeline_ref, fitting.clone(), LogKind::Exception, reason.clone(), HashMap::new())
                            .await;
                        queue_manager.worker_crashed(fitting, partition, reason, true).await;
                        return;
                    }
                }
            }
            WorkSignal::EndOfInput => {
                behavior.done(&effects).await;
                queue_manager.worker_done(fitting, partition).await;
                return;
            }
            WorkSignal::Stop => return,
            _ => unreachable!("WorkSignal is non_exhaustive but has no other variants"),
        }
    }
}

/// Recovers a human-readable message from a caught panic payload, falling
/// back to a generic description when the panic didn't raise with a `&str`
/// or `String` (e.g. `panic_any` with a custom payload type).
fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "stage callback panicked with a non-string payload".to_string()
    }
}
