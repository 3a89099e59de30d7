//! Network resilience orchestrator.
//!
//! Wraps HTTP calls with per-attempt timeouts, connection-quality aware
//! exponential backoff, offline queueing and replay on reconnect. Every call
//! ends in exactly one of: a response, a classified [`NetworkError`], or a
//! queued entry waiting for the next online transition.

pub mod api;
pub mod classification;
pub mod orchestrator;
pub mod quality;
pub mod request;
pub mod retry;
pub mod transport;

pub use api::ApiError;
pub use classification::{
    FailedAttempt, FailureMatcher, FailureRule, NetworkErrorClassifier, NetworkErrorKind,
};
pub use orchestrator::{
    NetworkOrchestrator, NetworkOrchestratorBuilder, NetworkRequestAttempt, NetworkStatus,
    ReplayOutcome, ReplayReport,
};
pub use quality::ConnectionQuality;
pub use request::{HttpResponse, RequestSpec, TransportError};
pub use retry::{
    default_retry_condition, fixed_jitter, random_jitter, JitterSource, RetryCondition,
    RetryConfig, RetryOverrides,
};
pub use transport::{HttpConnectivityProbe, HttpTransport, ReqwestTransport};

use serde::Serialize;
use thiserror::Error;

/// Terminal failure of an orchestrated request.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{kind} error for {url} after {attempts} attempt(s): {message}")]
pub struct NetworkError {
    pub kind: NetworkErrorKind,
    pub retryable: bool,
    pub message: String,
    pub url: String,
    /// Status of the last response, when the failure was a retryable status.
    pub status: Option<u16>,
    /// Transport calls made, including the first.
    pub attempts: u32,
    /// Retries made after the first call.
    pub retries: u32,
    /// The request was parked in the offline queue.
    pub queued: bool,
}

impl NetworkError {
    pub fn new(kind: NetworkErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
            message: message.into(),
            url: url.into(),
            status: None,
            attempts: 0,
            retries: 0,
            queued: false,
        }
    }
}
