//! The sink's address (spec.md §3, §6): every result, log, trace, and
//! end-of-input record for a pipeline is delivered here.

use std::sync::Arc;

use crate::records::{LogContext, LogKind, SinkRecord};
use crate::PipelineRef;

/// A cloneable address for a pipeline's sink.
#[derive(Clone)]
pub struct SinkHandle<Msg> {
    tx: flume::Sender<SinkRecord<Msg>>,
}

impl<Msg> SinkHandle<Msg> {
    /// Wraps a raw sender into a handle. Used by `pipeflow-sink`'s
    /// constructor.
    pub fn from_sender(tx: flume::Sender<SinkRecord<Msg>>) -> Self {
        Self { tx }
    }

    /// Delivers a successful output.
    pub async fn result(&self, pipeline_ref: PipelineRef, from_name: Arc<str>, value: Msg) {
        if let Err(error) = self
            .tx
            .send_async(SinkRecord::Result { pipeline_ref, from_name, value })
            .await
        {
            tracing::error!(%pipeline_ref, %error, "sink closed, result dropped");
        }
    }

    /// Delivers a log record.
    pub async fn log(&self, pipeline_ref: PipelineRef, from_name: Arc<str>, kind: LogKind, reason: String, context: LogContext) {
        if let Err(error) = self
            .tx
            .send_async(SinkRecord::Log {
                pipeline_ref,
                from_name,
                kind,
                reason,
                context,
            })
            .await
        {
            tracing::error!(%pipeline_ref, %error, "sink closed, log record dropped");
        }
    }

    /// Delivers a trace record.
    pub async fn trace(&self, pipeline_ref: PipelineRef, from_name: Arc<str>, topics: Vec<String>, msg: String) {
        if let Err(error) = self
            .tx
            .send_async(SinkRecord::Trace { pipeline_ref, from_name, topics, msg })
            .await
        {
            tracing::error!(%pipeline_ref, %error, "sink closed, trace record dropped");
        }
    }

    /// Delivers the pipeline's end-of-input record.
    pub async fn end_of_input(&self, pipeline_ref: PipelineRef) {
        if let Err(error) = self.tx.send_async(SinkRecord::EndOfInput { pipeline_ref }).await {
            tracing::error!(%pipeline_ref, %error, "sink closed, end-of-input record dropped");
        }
    }
}
