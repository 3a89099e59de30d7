//! Destinations for flushed error batches.
//!
//! Remote tracking and analytics backends are not wired up; the built-in
//! sinks only emit `tracing` events so deliveries stay observable.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ErrorRecord;

/// A sink refused or failed to accept a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{sink} rejected batch of {size}: {reason}")]
pub struct SinkError {
    pub sink: String,
    pub size: usize,
    pub reason: String,
}

impl SinkError {
    pub fn new(sink: impl Into<String>, size: usize, reason: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            size,
            reason: reason.into(),
        }
    }
}

/// Receives batches of records drained from the logger queue.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Delivers one batch. An error causes the whole batch to be re-queued.
    async fn send_batch(&self, batch: &[ErrorRecord]) -> Result<(), SinkError>;
}

/// Error tracking stub.
#[derive(Debug, Default, Clone)]
pub struct TrackingSink;

#[async_trait]
impl ErrorSink for TrackingSink {
    fn name(&self) -> &str {
        "tracking"
    }

    async fn send_batch(&self, batch: &[ErrorRecord]) -> Result<(), SinkError> {
        for record in batch {
            tracing::debug!(
                target: "lyra_resilience::tracking",
                error_id = %record.error_id,
                severity = %record.severity,
                message = %record.message,
                "tracked error"
            );
        }
        Ok(())
    }
}

/// Analytics stub. Emits one aggregate event per batch.
#[derive(Debug, Default, Clone)]
pub struct AnalyticsSink;

#[async_trait]
impl ErrorSink for AnalyticsSink {
    fn name(&self) -> &str {
        "analytics"
    }

    async fn send_batch(&self, batch: &[ErrorRecord]) -> Result<(), SinkError> {
        let unrecoverable = batch.iter().filter(|r| !r.recoverable).count();
        tracing::debug!(
            target: "lyra_resilience::analytics",
            size = batch.len(),
            unrecoverable,
            "error batch analytics"
        );
        Ok(())
    }
}
