//! Learned success rates and aggregate recovery statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::strategy::duration_ms;
use super::RecoveryResult;

/// Persisted success record for one strategy id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessRecord {
    /// Successes divided by `sample_size`.
    pub rate: f64,
    pub last_updated: DateTime<Utc>,
    /// Number of outcomes the rate was computed over (at most the window).
    pub sample_size: usize,
    /// Most recent outcomes, oldest first.
    #[serde(default)]
    pub outcomes: Vec<bool>,
}

impl SuccessRecord {
    pub fn new() -> Self {
        Self {
            rate: 0.0,
            last_updated: Utc::now(),
            sample_size: 0,
            outcomes: Vec::new(),
        }
    }

    /// Adds an outcome and recomputes the rate over the last `window` outcomes.
    pub fn record(&mut self, success: bool, window: usize) {
        let window = window.max(1);
        self.outcomes.push(success);
        if self.outcomes.len() > window {
            let excess = self.outcomes.len() - window;
            self.outcomes.drain(..excess);
        }

        self.sample_size = self.outcomes.len();
        let successes = self.outcomes.iter().filter(|&&ok| ok).count();
        self.rate = successes as f64 / self.sample_size as f64;
        self.last_updated = Utc::now();
    }
}

impl Default for SuccessRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-strategy breakdown of the recovery history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyStats {
    pub attempts: usize,
    pub successes: usize,
    pub success_rate: f64,
    #[serde(with = "duration_ms")]
    pub average_duration: Duration,
}

/// Aggregate view over the recovery history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryStats {
    pub total_attempts: usize,
    pub success_rate: f64,
    #[serde(with = "duration_ms")]
    pub average_duration: Duration,
    pub per_strategy: BTreeMap<String, StrategyStats>,
}

impl RecoveryStats {
    pub fn from_history<'a, I>(history: I) -> Self
    where
        I: IntoIterator<Item = &'a RecoveryResult>,
    {
        let mut stats = RecoveryStats::default();
        let mut successes = 0usize;
        let mut total_duration = Duration::ZERO;
        let mut per_strategy_durations: BTreeMap<String, Duration> = BTreeMap::new();

        for result in history {
            stats.total_attempts += 1;
            total_duration += result.duration;

            let entry = stats.per_strategy.entry(result.strategy.clone()).or_default();
            entry.attempts += 1;
            *per_strategy_durations
                .entry(result.strategy.clone())
                .or_default() += result.duration;

            if result.success {
                successes += 1;
                entry.successes += 1;
            }
        }

        if stats.total_attempts > 0 {
            stats.success_rate = successes as f64 / stats.total_attempts as f64;
            stats.average_duration = total_duration / stats.total_attempts as u32;
        }

        for (id, entry) in stats.per_strategy.iter_mut() {
            entry.success_rate = entry.successes as f64 / entry.attempts as f64;
            if let Some(total) = per_strategy_durations.get(id) {
                entry.average_duration = *total / entry.attempts as u32;
            }
        }

        stats
    }
}
