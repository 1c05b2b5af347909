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

//! The pipeline sink (spec.md §3, §6): a single channel that receives every
//! result, log, trace, and end-of-input record for one or more pipelines,
//! and the client-facing `receive_result`/`collect_results` surface that
//! demultiplexes it by pipeline reference.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use pipeflow_proto::{PipelineRef, SinkRecord};

/// Creates a fresh sink channel: the producer handle every fitting's workers
/// and coordinators are given, and the receiver a client reads results from.
pub fn channel<Msg>() -> (pipeflow_proto::SinkHandle<Msg>, SinkReceiver<Msg>) {
    let (tx, rx) = flume::unbounded();
    (pipeflow_proto::SinkHandle::from_sender(tx), SinkReceiver::new(rx))
}

/// One record surfaced to a client through `receive_result` (spec.md §6).
/// Trace records are sink-visible but not part of this client-facing
/// surface; `recv_record` exposes them for callers that need them.
#[derive(Debug, Clone)]
pub enum ReceivedRecord<Msg> {
    /// A successful output from a fitting.
    Result {
        /// The value.
        value: Msg,
        /// The fitting that produced it.
        from: Arc<str>,
    },
    /// A log record, collapsed to its human-readable reason.
    Log {
        /// The reason string.
        msg: String,
        /// The fitting that produced it.
        from: Arc<str>,
    },
    /// End-of-input for this pipeline.
    Eoi,
}

/// The receiving side of a sink channel, demultiplexed by pipeline reference
/// so several pipelines can share one sink process (spec.md §6).
pub struct SinkReceiver<Msg> {
    rx: flume::Receiver<SinkRecord<Msg>>,
    pending: Mutex<HashMap<PipelineRef, VecDeque<SinkRecord<Msg>>>>,
}

impl<Msg> SinkReceiver<Msg> {
    /// Wraps a raw receiver. Used by [`channel`]; other crates never build
    /// one by hand.
    pub fn new(rx: flume::Receiver<SinkRecord<Msg>>) -> Self {
        Self { rx, pending: Mutex::new(HashMap::new()) }
    }

    /// Blocking receive of the next raw record for any pipeline, bypassing
    /// demultiplexing. Used by callers that want traces or want to inspect
    /// records across pipelines.
    pub async fn recv_record(&self) -> Option<SinkRecord<Msg>> {
        self.rx.recv_async().await.ok()
    }

    fn take_pending(&self, pipeline_ref: PipelineRef) -> Option<SinkRecord<Msg>> {
        let mut pending = self.pending.lock().expect("sink pending queue poisoned");
        pending.get_mut(&pipeline_ref).and_then(VecDeque::pop_front)
    }

    fn stash(&self, pipeline_ref: PipelineRef, record: SinkRecord<Msg>) {
        self.pending
            .lock()
            .expect("sink pending queue poisoned")
            .entry(pipeline_ref)
            .or_default()
            .push_back(record);
    }

    /// Blocking receive of the next result, log, or end-of-input record for
    /// `pipeline_ref`, stashing records belonging to other pipelines for
    /// their own callers (spec.md §6).
    pub async fn receive_result(&self, pipeline_ref: PipelineRef) -> Option<ReceivedRecord<Msg>> {
        loop {
            if let Some(record) = self.take_pending(pipeline_ref) {
                if let Some(received) = into_received(record) {
                    return Some(received);
                }
                continue;
            }

            let record = self.rx.recv_async().await.ok()?;
            if record_pipeline_ref(&record) != pipeline_ref {
                self.stash(record_pipeline_ref(&record), record);
                continue;
            }

            if let Some(received) = into_received(record) {
                return Some(received);
            }
        }
    }

    /// Drains `receive_result` until end-of-input, collecting results and
    /// logs in arrival order (spec.md §6).
    pub async fn collect_results(&self, pipeline_ref: PipelineRef) -> (Vec<(Msg, Arc<str>)>, Vec<(String, Arc<str>)>) {
        let mut results = Vec::new();
        let mut logs = Vec::new();
        loop {
            match self.receive_result(pipeline_ref).await {
                Some(ReceivedRecord::Result { value, from }) => results.push((value, from)),
                Some(ReceivedRecord::Log { msg, from }) => logs.push((msg, from)),
                Some(ReceivedRecord::Eoi) | None => break,
            }
        }
        (results, logs)
    }
}

fn record_pipeline_ref<Msg>(record: &SinkRecord<Msg>) -> PipelineRef {
    match record {
        SinkRecord::Result { pipeline_ref, .. }
        | SinkRecord::Log { pipeline_ref, .. }
        | SinkRecord::Trace { pipeline_ref, .. }
        | SinkRecord::EndOfInput { pipeline_ref } => *pipeline_ref,
    }
}

/// Traces aren't part of the client-facing surface; returns `None` for them
/// so the caller's loop keeps reading.
fn into_received<Msg>(record: SinkRecord<Msg>) -> Option<ReceivedRecord<Msg>> {
    match record {
        SinkRecord::Result { from_name, value, .. } => Some(ReceivedRecord::Result { value, from: from_name }),
        SinkRecord::Log { from_name, reason, .. } => Some(ReceivedRecord::Log { msg: reason, from: from_name }),
        SinkRecord::EndOfInput { .. } => Some(ReceivedRecord::Eoi),
        SinkRecord::Trace { .. } => None,
    }
}
