//! Recovery strategy and result types.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RecoveryError;
use crate::config::RecoveryConfig;
use crate::error::ErrorCategory;
use crate::events::ResetBus;
use crate::platform::Platform;

/// Everything a recovery action may touch.
#[derive(Debug, Clone)]
pub struct RecoveryContext {
    pub platform: Platform,
    pub resets: ResetBus,
    pub config: RecoveryConfig,
}

/// The executable part of a strategy.
#[async_trait]
pub trait RecoveryAction: Send + Sync {
    async fn run(&self, ctx: &RecoveryContext) -> Result<(), RecoveryError>;
}

struct FnAction<F>(F);

#[async_trait]
impl<F, Fut> RecoveryAction for FnAction<F>
where
    F: Fn(RecoveryContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), RecoveryError>> + Send,
{
    async fn run(&self, ctx: &RecoveryContext) -> Result<(), RecoveryError> {
        (self.0)(ctx.clone()).await
    }
}

/// A named, independently executable remediation.
#[derive(Clone)]
pub struct RecoveryStrategy {
    pub id: String,
    pub name: String,
    pub description: String,
    pub estimated_time: Duration,
    /// Prior success rate, replaced by the learned rate once attempts exist.
    pub success_rate: f64,
    /// Error categories this strategy is a sensible response to.
    pub categories: Vec<ErrorCategory>,
    pub action: Arc<dyn RecoveryAction>,
}

impl fmt::Debug for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryStrategy")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("estimated_time", &self.estimated_time)
            .field("success_rate", &self.success_rate)
            .finish_non_exhaustive()
    }
}

impl RecoveryStrategy {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        estimated_time: Duration,
        action: Arc<dyn RecoveryAction>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            estimated_time,
            success_rate: 0.5,
            categories: Vec::new(),
            action,
        }
    }

    /// Strategy whose action is an async closure.
    pub fn from_fn<F, Fut>(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        estimated_time: Duration,
        action: F,
    ) -> Self
    where
        F: Fn(RecoveryContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RecoveryError>> + Send + 'static,
    {
        Self::new(id, name, description, estimated_time, Arc::new(FnAction(action)))
    }

    pub fn with_success_rate(mut self, rate: f64) -> Self {
        self.success_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_categories(mut self, categories: &[ErrorCategory]) -> Self {
        self.categories = categories.to_vec();
        self
    }

    pub fn handles(&self, category: ErrorCategory) -> bool {
        self.categories.contains(&category)
    }

    pub fn summary(&self) -> StrategySummary {
        StrategySummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            estimated_time: self.estimated_time,
            success_rate: self.success_rate,
        }
    }
}

/// Serializable description of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySummary {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(with = "duration_ms")]
    pub estimated_time: Duration,
    pub success_rate: f64,
}

/// Outcome of one strategy execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResult {
    pub success: bool,
    /// Id of the executed strategy.
    pub strategy: String,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Serializes a `Duration` as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
