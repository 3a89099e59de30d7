//! Integration tests for the recovery manager and the service bundle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lyra_resilience::config::{RecoveryConfig, ResilienceConfig};
use lyra_resilience::error::{ErrorCategory, ErrorDetails};
use lyra_resilience::events::{ResetBus, ResetEvent};
use lyra_resilience::platform::{
    CacheStorage, CookieJar, DocumentDatabases, HeadlessServiceWorker, MemoryCacheStorage,
    MemoryCookieJar, MemoryDocumentDatabases, Platform, ServiceWorkerMessage, StaticProbe,
};
use lyra_resilience::recovery::{ids, RecoveryError, RecoveryManager, RecoveryStrategy};
use lyra_resilience::store::{KeyValueStore, MemoryStore};
use lyra_resilience::ResilienceServices;

// ============================================================================
// Helpers
// ============================================================================

struct Fixture {
    local: Arc<MemoryStore>,
    session: Arc<MemoryStore>,
    platform: Platform,
}

impl Fixture {
    fn new() -> Self {
        let local = Arc::new(MemoryStore::new());
        let session = Arc::new(MemoryStore::new());
        let platform = Platform::headless().with_stores(local.clone(), session.clone());
        Self {
            local,
            session,
            platform,
        }
    }

    fn manager(&self) -> RecoveryManager {
        RecoveryManager::new(RecoveryConfig::default(), self.platform.clone(), ResetBus::new())
    }
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_full_wipe_is_idempotent() {
    let caches = Arc::new(MemoryCacheStorage::with_caches(["lessons-v2", "static-assets"]));
    let databases = Arc::new(MemoryDocumentDatabases::with_databases(["progress"]));
    let cookies = Arc::new(MemoryCookieJar::with_cookies(["sb-access-token"]));

    let fixture = Fixture::new();
    let mut platform = fixture.platform.clone();
    platform.caches = caches.clone();
    platform.databases = databases.clone();
    platform.cookies = cookies.clone();
    fixture.local.set("lesson_progress_cache", "{}").unwrap();
    fixture.session.set("current_lesson", "3").unwrap();

    let manager = RecoveryManager::new(RecoveryConfig::default(), platform, ResetBus::new());

    let first = manager.clear_all_caches().await.unwrap();
    let second = manager.clear_all_caches().await.unwrap();

    assert!(first.success);
    assert!(second.success);
    assert!(caches.keys().await.unwrap().is_empty());
    assert!(databases.names().await.unwrap().is_empty());
    assert!(cookies.names().is_empty());
    assert!(fixture.session.is_empty());
    assert_eq!(fixture.local.get("lesson_progress_cache").unwrap(), None);
}

#[tokio::test]
async fn test_panicking_strategy_yields_failed_result() {
    fn explode() -> Result<(), RecoveryError> {
        panic!("cache handle vanished")
    }

    let fixture = Fixture::new();
    let manager = fixture.manager();
    let strategy = RecoveryStrategy::from_fn("fragile", "Fragile", "", Duration::ZERO, |_| async {
        explode()
    });

    let result = manager.execute_recovery_strategy(&strategy).await;

    assert!(!result.success);
    assert_eq!(result.strategy, "fragile");
    assert!(result.error.unwrap().contains("cache handle vanished"));
    assert_eq!(manager.recovery_history().len(), 1);
}

#[tokio::test]
async fn test_offline_mode_posts_message_to_worker() {
    let worker = Arc::new(HeadlessServiceWorker::new());
    let fixture = Fixture::new();
    let platform = fixture.platform.clone().with_service_worker(worker.clone());
    let manager = RecoveryManager::new(RecoveryConfig::default(), platform, ResetBus::new());

    let result = manager.enable_offline_mode().await.unwrap();

    assert!(result.success);
    assert_eq!(
        worker.messages(),
        vec![ServiceWorkerMessage::EnableOfflineMode {
            message: RecoveryConfig::default().offline_message,
        }]
    );
}

#[tokio::test]
async fn test_dns_refresh_probes_external_url_without_cors() {
    let probe = Arc::new(StaticProbe::reachable());
    let fixture = Fixture::new();
    let platform = fixture.platform.clone().with_probe(probe.clone());
    let manager = RecoveryManager::new(RecoveryConfig::default(), platform, ResetBus::new());

    let result = manager.execute_by_id(ids::DNS_REFRESH).await.unwrap();

    assert!(result.success);
    let calls = probe.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.contains("_cb="));
}

// ============================================================================
// Learned success rates
// ============================================================================

#[tokio::test]
async fn test_success_rate_follows_last_ten_outcomes() {
    let probe = Arc::new(StaticProbe::unreachable());
    let fixture = Fixture::new();
    let platform = fixture.platform.clone().with_probe(probe.clone());
    let manager = RecoveryManager::new(RecoveryConfig::default(), platform, ResetBus::new());

    for _ in 0..10 {
        manager.test_connectivity().await.unwrap();
    }
    assert_eq!(manager.success_rate(ids::CONNECTIVITY_TEST), Some(0.0));

    probe.set_reachable(true);
    for _ in 0..4 {
        manager.test_connectivity().await.unwrap();
    }

    let rate = manager.success_rate(ids::CONNECTIVITY_TEST).unwrap();
    assert!((rate - 0.4).abs() < 1e-9, "rate was {}", rate);
    assert_eq!(
        manager.strategy(ids::CONNECTIVITY_TEST).unwrap().success_rate,
        rate
    );
}

#[tokio::test]
async fn test_learned_rates_survive_restart() {
    let fixture = Fixture::new();
    let platform = fixture
        .platform
        .clone()
        .with_probe(Arc::new(StaticProbe::unreachable()));

    let manager = RecoveryManager::new(RecoveryConfig::default(), platform.clone(), ResetBus::new());
    manager.test_connectivity().await.unwrap();
    manager.test_connectivity().await.unwrap();

    let reopened = RecoveryManager::new(RecoveryConfig::default(), platform, ResetBus::new());
    assert_eq!(
        reopened.strategy(ids::CONNECTIVITY_TEST).unwrap().success_rate,
        0.0
    );
    assert_eq!(reopened.recovery_history().len(), 2);

    let stats = reopened.get_recovery_stats();
    assert_eq!(stats.total_attempts, 2);
    assert_eq!(stats.success_rate, 0.0);
    assert_eq!(stats.per_strategy[ids::CONNECTIVITY_TEST].attempts, 2);
}

#[tokio::test]
async fn test_concurrent_runs_count_every_outcome() {
    let runs = Arc::new(AtomicUsize::new(0));
    let fixture = Fixture::new();
    let manager = fixture.manager();

    let counter = runs.clone();
    let strategy = RecoveryStrategy::from_fn("counted", "Counted", "", Duration::ZERO, move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(())
        }
    });

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            let strategy = strategy.clone();
            tokio::spawn(async move { manager.execute_recovery_strategy(&strategy).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().success);
    }

    assert_eq!(runs.load(Ordering::SeqCst), 8);
    let raw = fixture.local.get("recovery_success_counted").unwrap().unwrap();
    assert!(raw.contains("\"sampleSize\":8"));
}

#[test]
fn test_recommendations_without_runtime() {
    let fixture = Fixture::new();
    let manager = fixture.manager();

    let render = manager.recommended_strategies(ErrorCategory::Render);
    let order: Vec<&str> = render.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(
        order,
        vec![ids::FULL_WIPE, ids::CHUNK_CACHE_CLEAR, ids::APPLICATION_STATE_RESET]
    );

    let result = tokio_test::block_on(manager.reset_application_state()).unwrap();
    assert!(result.success);
}

// ============================================================================
// Scoped resets
// ============================================================================

#[tokio::test]
async fn test_application_reset_clears_listed_state() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let mut resets = manager.resets().subscribe();

    fixture.local.set("app_state", "{}").unwrap();
    fixture.local.set("query_cache:lessons", "[]").unwrap();
    fixture.local.set("theme", "dark").unwrap();
    fixture.session.set("navigation_state", "{}").unwrap();

    let result = manager.reset_application_state().await.unwrap();

    assert!(result.success);
    assert_eq!(fixture.local.get("app_state").unwrap(), None);
    assert_eq!(fixture.local.get("query_cache:lessons").unwrap(), None);
    assert_eq!(fixture.session.get("navigation_state").unwrap(), None);
    assert_eq!(fixture.local.get("theme").unwrap().as_deref(), Some("dark"));
    assert_eq!(resets.recv().await.unwrap(), ResetEvent::Application);
}

#[tokio::test]
async fn test_pattern_reset_is_scoped() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let mut resets = manager.resets().subscribe();

    fixture.local.set("pattern_state_drag-drop", "{}").unwrap();
    fixture.session.set("pattern_drag-drop_target", "3").unwrap();
    fixture.local.set("pattern_state_quiz", "{}").unwrap();

    let result = manager.reset_pattern("drag-drop").await;

    assert!(result.success);
    assert_eq!(result.strategy, ids::PATTERN_RESET);
    assert_eq!(fixture.local.get("pattern_state_drag-drop").unwrap(), None);
    assert_eq!(fixture.session.get("pattern_drag-drop_target").unwrap(), None);
    assert!(fixture.local.get("pattern_state_quiz").unwrap().is_some());
    assert_eq!(
        resets.recv().await.unwrap(),
        ResetEvent::Pattern {
            pattern_type: "drag-drop".to_string()
        }
    );
}

#[tokio::test]
async fn test_character_component_reset_includes_chapter_progress() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let mut resets = manager.resets().subscribe();

    fixture.local.set("carmen_dialogue_state", "4").unwrap();
    fixture.session.set("carmen_dialogue_draft", "hi").unwrap();
    fixture.local.set("carmen_dialogueHistory_state", "[]").unwrap();
    fixture.local.set("chapter_2_carmen_progress", "0.5").unwrap();
    fixture.local.set("chapter_3_carmen_progress", "0.1").unwrap();

    let result = manager
        .reset_character_component("carmen", "dialogue", Some(2))
        .await;

    assert!(result.success);
    assert_eq!(fixture.local.get("carmen_dialogue_state").unwrap(), None);
    assert_eq!(fixture.session.get("carmen_dialogue_draft").unwrap(), None);
    assert!(fixture
        .local
        .get("carmen_dialogueHistory_state")
        .unwrap()
        .is_some());
    assert_eq!(fixture.local.get("chapter_2_carmen_progress").unwrap(), None);
    assert!(fixture.local.get("chapter_3_carmen_progress").unwrap().is_some());
    assert_eq!(
        resets.recv().await.unwrap(),
        ResetEvent::CharacterComponent {
            character: "carmen".to_string(),
            component: "dialogue".to_string(),
        }
    );
}

// ============================================================================
// Service bundle
// ============================================================================

#[tokio::test]
async fn test_services_share_one_platform() {
    let fixture = Fixture::new();
    let services =
        ResilienceServices::new(ResilienceConfig::default(), fixture.platform.clone()).unwrap();
    services.start();

    let record = services
        .logger
        .log_error(ErrorDetails::new("Failed to fetch chapter", "ChapterView"))
        .await;
    let suggested = services.recovery.recommended_strategies(record.category);
    assert!(suggested.iter().any(|s| s.id == ids::CONNECTIVITY_TEST));

    let result = services.recovery.test_connectivity().await.unwrap();
    assert!(result.success);
    assert!(fixture.local.get("recovery_history").unwrap().is_some());
    assert!(fixture.local.get("error_logs").unwrap().is_some());

    services.shutdown().await;
    assert!(!services.logger.is_running());
}
