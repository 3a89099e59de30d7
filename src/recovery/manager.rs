//! Executes recovery strategies and learns their success rates.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Mutex as AsyncMutex;

use super::catalog::{self, ids};
use super::stats::{RecoveryStats, SuccessRecord};
use super::strategy::{RecoveryContext, RecoveryResult, RecoveryStrategy};
use super::RecoveryError;
use crate::config::RecoveryConfig;
use crate::error::ErrorCategory;
use crate::events::ResetBus;
use crate::platform::Platform;
use crate::store::{get_json, set_json};

/// Runs recovery strategies against a [`Platform`].
///
/// Cloning yields another handle to the same catalog, history and rate locks.
#[derive(Clone)]
pub struct RecoveryManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: RecoveryConfig,
    platform: Platform,
    resets: ResetBus,
    strategies: RwLock<Vec<RecoveryStrategy>>,
    history: Mutex<VecDeque<RecoveryResult>>,
    rate_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl std::fmt::Debug for RecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryManager")
            .field("platform", &self.inner.platform)
            .field("history_len", &self.recovery_history().len())
            .finish_non_exhaustive()
    }
}

impl RecoveryManager {
    /// Builds a manager with the built-in catalog.
    ///
    /// The history is seeded from local storage and each catalog entry picks
    /// up its persisted learned rate, if any.
    pub fn new(config: RecoveryConfig, platform: Platform, resets: ResetBus) -> Self {
        let history = load_history(&platform, &config);
        let manager = Self {
            inner: Arc::new(ManagerInner {
                config,
                platform,
                resets,
                strategies: RwLock::new(Vec::new()),
                history: Mutex::new(history),
                rate_locks: Mutex::new(HashMap::new()),
            }),
        };

        for strategy in catalog::default_strategies() {
            manager.register(strategy);
        }
        manager
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.inner.config
    }

    pub fn platform(&self) -> &Platform {
        &self.inner.platform
    }

    /// Bus on which state-reset strategies announce what they cleared.
    pub fn resets(&self) -> &ResetBus {
        &self.inner.resets
    }

    /// Adds a strategy, replacing any existing one with the same id.
    pub fn register(&self, mut strategy: RecoveryStrategy) {
        if let Some(record) = self.load_success_record(&strategy.id) {
            if record.sample_size > 0 {
                strategy.success_rate = record.rate;
            }
        }

        let Ok(mut strategies) = self.inner.strategies.write() else {
            tracing::warn!(id = %strategy.id, "strategy catalog lock poisoned");
            return;
        };
        match strategies.iter_mut().find(|s| s.id == strategy.id) {
            Some(existing) => *existing = strategy,
            None => strategies.push(strategy),
        }
    }

    pub fn strategies(&self) -> Vec<RecoveryStrategy> {
        self.inner
            .strategies
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn strategy(&self, id: &str) -> Option<RecoveryStrategy> {
        self.inner
            .strategies
            .read()
            .ok()
            .and_then(|s| s.iter().find(|s| s.id == id).cloned())
    }

    /// Learned success rate for `id`, falling back to the strategy's prior.
    pub fn success_rate(&self, id: &str) -> Option<f64> {
        match self.load_success_record(id) {
            Some(record) if record.sample_size > 0 => Some(record.rate),
            _ => self.strategy(id).map(|s| s.success_rate),
        }
    }

    /// Runs `strategy` and records the outcome.
    ///
    /// Never fails: an error returned by the action, or a panic inside it,
    /// becomes an unsuccessful [`RecoveryResult`].
    pub async fn execute_recovery_strategy(&self, strategy: &RecoveryStrategy) -> RecoveryResult {
        let ctx = self.context();
        let started = Instant::now();

        let outcome = AssertUnwindSafe(strategy.action.run(&ctx))
            .catch_unwind()
            .await;
        let duration = started.elapsed();

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(RecoveryError::Panicked(panic_message(panic.as_ref())).to_string()),
        };

        let result = RecoveryResult {
            success: error.is_none(),
            strategy: strategy.id.clone(),
            duration,
            error,
            timestamp: Utc::now(),
        };

        if result.success {
            tracing::info!(strategy = %result.strategy, ?duration, "recovery strategy succeeded");
        } else {
            tracing::warn!(
                strategy = %result.strategy,
                ?duration,
                error = result.error.as_deref().unwrap_or_default(),
                "recovery strategy failed"
            );
        }

        self.update_success_rate(&strategy.id, result.success).await;
        self.append_history(result.clone());
        result
    }

    /// Runs the catalog strategy with `id`.
    pub async fn execute_by_id(&self, id: &str) -> Result<RecoveryResult, RecoveryError> {
        let strategy = self
            .strategy(id)
            .ok_or_else(|| RecoveryError::UnknownStrategy(id.to_string()))?;
        Ok(self.execute_recovery_strategy(&strategy).await)
    }

    pub async fn test_connectivity(&self) -> Result<RecoveryResult, RecoveryError> {
        self.execute_by_id(ids::CONNECTIVITY_TEST).await
    }

    pub async fn enable_offline_mode(&self) -> Result<RecoveryResult, RecoveryError> {
        self.execute_by_id(ids::OFFLINE_MODE).await
    }

    pub async fn clear_chunk_cache(&self) -> Result<RecoveryResult, RecoveryError> {
        self.execute_by_id(ids::CHUNK_CACHE_CLEAR).await
    }

    pub async fn reset_application_state(&self) -> Result<RecoveryResult, RecoveryError> {
        self.execute_by_id(ids::APPLICATION_STATE_RESET).await
    }

    pub async fn clear_all_caches(&self) -> Result<RecoveryResult, RecoveryError> {
        self.execute_by_id(ids::FULL_WIPE).await
    }

    pub async fn reset_pattern(&self, pattern_type: &str) -> RecoveryResult {
        let strategy = catalog::pattern_reset(pattern_type);
        self.execute_recovery_strategy(&strategy).await
    }

    pub async fn reset_character_component(
        &self,
        character: &str,
        component: &str,
        chapter: Option<u32>,
    ) -> RecoveryResult {
        let strategy = catalog::character_component_reset(character, component, chapter);
        self.execute_recovery_strategy(&strategy).await
    }

    /// Catalog strategies relevant to `category`, best learned rate first.
    ///
    /// Ties go to the faster strategy.
    pub fn recommended_strategies(&self, category: ErrorCategory) -> Vec<RecoveryStrategy> {
        let mut candidates: Vec<RecoveryStrategy> = self
            .strategies()
            .into_iter()
            .filter(|s| s.handles(category))
            .collect();

        candidates.sort_by(|a, b| {
            b.success_rate
                .total_cmp(&a.success_rate)
                .then_with(|| a.estimated_time.cmp(&b.estimated_time))
        });
        candidates
    }

    /// Most recent results, oldest first.
    pub fn recovery_history(&self) -> Vec<RecoveryResult> {
        self.inner
            .history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_recovery_stats(&self) -> RecoveryStats {
        let history = self.recovery_history();
        RecoveryStats::from_history(&history)
    }

    fn context(&self) -> RecoveryContext {
        RecoveryContext {
            platform: self.inner.platform.clone(),
            resets: self.inner.resets.clone(),
            config: self.inner.config.clone(),
        }
    }

    fn success_key(&self, id: &str) -> String {
        format!("{}{}", self.inner.config.success_rate_prefix, id)
    }

    fn load_success_record(&self, id: &str) -> Option<SuccessRecord> {
        let key = self.success_key(id);
        match get_json(self.inner.platform.local.as_ref(), &key) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "ignoring unreadable success record");
                None
            }
        }
    }

    fn rate_lock(&self, id: &str) -> Arc<AsyncMutex<()>> {
        match self.inner.rate_locks.lock() {
            Ok(mut locks) => locks.entry(id.to_string()).or_default().clone(),
            Err(_) => Arc::new(AsyncMutex::new(())),
        }
    }

    async fn update_success_rate(&self, id: &str, success: bool) {
        let lock = self.rate_lock(id);
        let _guard = lock.lock().await;

        let mut record = self.load_success_record(id).unwrap_or_default();
        record.record(success, self.inner.config.success_window);

        let key = self.success_key(id);
        if let Err(e) = set_json(self.inner.platform.local.as_ref(), &key, &record) {
            tracing::warn!(key = %key, error = %e, "failed to persist success rate");
        }

        if let Ok(mut strategies) = self.inner.strategies.write() {
            if let Some(strategy) = strategies.iter_mut().find(|s| s.id == id) {
                strategy.success_rate = record.rate;
            }
        }
        tracing::debug!(strategy = id, rate = record.rate, samples = record.sample_size, "success rate updated");
    }

    fn append_history(&self, result: RecoveryResult) {
        let snapshot: Vec<RecoveryResult> = {
            let Ok(mut history) = self.inner.history.lock() else {
                tracing::warn!("recovery history lock poisoned");
                return;
            };
            history.push_back(result);
            while history.len() > self.inner.config.history_capacity {
                history.pop_front();
            }
            history.iter().cloned().collect()
        };

        let key = &self.inner.config.history_key;
        if let Err(e) = set_json(self.inner.platform.local.as_ref(), key, &snapshot) {
            tracing::warn!(key = %key, error = %e, "failed to persist recovery history");
        }
    }
}

fn load_history(platform: &Platform, config: &RecoveryConfig) -> VecDeque<RecoveryResult> {
    let mut history: VecDeque<RecoveryResult> =
        match get_json::<Vec<RecoveryResult>>(platform.local.as_ref(), &config.history_key) {
            Ok(Some(entries)) => entries.into(),
            Ok(None) => VecDeque::new(),
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable recovery history");
                VecDeque::new()
            }
        };

    while history.len() > config.history_capacity {
        history.pop_front();
    }
    history
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::platform::StaticProbe;
    use crate::store::{KeyValueStore, MemoryStore};

    fn manager_with(platform: Platform) -> RecoveryManager {
        RecoveryManager::new(RecoveryConfig::default(), platform, ResetBus::new())
    }

    #[tokio::test]
    async fn test_catalog_is_registered() {
        let manager = manager_with(Platform::headless());
        let ids: Vec<String> = manager.strategies().into_iter().map(|s| s.id).collect();
        assert!(ids.contains(&ids::FULL_WIPE.to_string()));
        assert!(ids.contains(&ids::DNS_REFRESH.to_string()));
        assert_eq!(ids.len(), 6);
    }

    #[tokio::test]
    async fn test_failed_action_is_captured() {
        let manager = manager_with(Platform::headless());
        let strategy = RecoveryStrategy::from_fn("flaky", "Flaky", "", Duration::ZERO, |_| async {
            Err(RecoveryError::Failed("disk full".to_string()))
        });

        let result = manager.execute_recovery_strategy(&strategy).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("disk full"));
        assert_eq!(manager.recovery_history().len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_action_is_captured() {
        let manager = manager_with(Platform::headless());
        fn explode() -> Result<(), RecoveryError> {
            panic!("exploded")
        }
        let strategy =
            RecoveryStrategy::from_fn("boom", "Boom", "", Duration::ZERO, |_| async { explode() });

        let result = manager.execute_recovery_strategy(&strategy).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("exploded"));
        assert!(result.duration >= Duration::ZERO);
    }

    #[tokio::test]
    async fn test_success_rate_is_persisted() {
        let local = Arc::new(MemoryStore::new());
        let platform = Platform::headless()
            .with_stores(local.clone(), Arc::new(MemoryStore::new()))
            .with_probe(Arc::new(StaticProbe::unreachable()));
        let manager = manager_with(platform);

        manager.test_connectivity().await.unwrap();
        manager.test_connectivity().await.unwrap();

        assert_eq!(manager.success_rate(ids::CONNECTIVITY_TEST), Some(0.0));
        let raw = local.get("recovery_success_connectivity-test").unwrap().unwrap();
        assert!(raw.contains("\"sampleSize\":2"));
    }

    #[tokio::test]
    async fn test_history_is_bounded_and_seeded() {
        let local = Arc::new(MemoryStore::new());
        let platform = Platform::headless().with_stores(local.clone(), Arc::new(MemoryStore::new()));
        let manager = manager_with(platform.clone());

        let strategy = RecoveryStrategy::from_fn("ok", "Ok", "", Duration::ZERO, |_| async { Ok(()) });
        for _ in 0..55 {
            manager.execute_recovery_strategy(&strategy).await;
        }
        assert_eq!(manager.recovery_history().len(), 50);

        let reopened = manager_with(platform);
        assert_eq!(reopened.get_recovery_stats().total_attempts, 50);
    }

    #[tokio::test]
    async fn test_unknown_strategy_id() {
        let manager = manager_with(Platform::headless());
        let err = manager.execute_by_id("nope").await.unwrap_err();
        assert!(matches!(err, RecoveryError::UnknownStrategy(_)));
    }

    #[tokio::test]
    async fn test_recommended_strategies_follow_learned_rate() {
        let manager = manager_with(Platform::headless().with_probe(Arc::new(StaticProbe::unreachable())));

        let before = manager.recommended_strategies(ErrorCategory::Network);
        assert_eq!(before[0].id, ids::FULL_WIPE);
        assert_eq!(before[1].id, ids::OFFLINE_MODE);

        // Offline mode fails without a service worker
        for _ in 0..3 {
            manager.enable_offline_mode().await.unwrap();
        }

        let after = manager.recommended_strategies(ErrorCategory::Network);
        assert_eq!(after.last().map(|s| s.id.as_str()), Some(ids::OFFLINE_MODE));
        assert!(after.iter().all(|s| s.handles(ErrorCategory::Network)));
    }
}
