//! Built-in recovery strategies.
//!
//! Each strategy is a small [`RecoveryAction`] working only through the
//! [`Platform`](crate::platform::Platform) capabilities in its context. The
//! fixed catalog is returned by [`default_strategies`]; scoped resets need a
//! target and are built on demand by [`pattern_reset`] and
//! [`character_component_reset`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::strategy::{RecoveryAction, RecoveryContext, RecoveryStrategy};
use super::RecoveryError;
use crate::error::ErrorCategory;
use crate::events::ResetEvent;
use crate::platform::{PlatformError, ProbeMode, ServiceWorkerMessage};
use crate::store::{remove_prefixed, KeyValueStore};

/// Strategy ids.
pub mod ids {
    pub const CONNECTIVITY_TEST: &str = "connectivity-test";
    pub const DNS_REFRESH: &str = "dns-refresh";
    pub const OFFLINE_MODE: &str = "offline-mode";
    pub const CHUNK_CACHE_CLEAR: &str = "chunk-cache-clear";
    pub const APPLICATION_STATE_RESET: &str = "application-state-reset";
    pub const PATTERN_RESET: &str = "pattern-reset";
    pub const CHARACTER_COMPONENT_RESET: &str = "character-component-reset";
    pub const FULL_WIPE: &str = "full-wipe";
}

/// The fixed catalog, in presentation order.
pub fn default_strategies() -> Vec<RecoveryStrategy> {
    use ErrorCategory::*;

    vec![
        RecoveryStrategy::new(
            ids::CONNECTIVITY_TEST,
            "Test connectivity",
            "Probe the application origin to confirm the network is reachable",
            Duration::from_secs(2),
            Arc::new(ConnectivityTest),
        )
        .with_success_rate(0.8)
        .with_categories(&[Network]),
        RecoveryStrategy::new(
            ids::DNS_REFRESH,
            "Refresh DNS",
            "Issue a cache-busting request to an external host to refresh name resolution",
            Duration::from_secs(3),
            Arc::new(DnsRefresh),
        )
        .with_success_rate(0.6)
        .with_categories(&[Network]),
        RecoveryStrategy::new(
            ids::OFFLINE_MODE,
            "Enable offline mode",
            "Ask the service worker to serve cached content",
            Duration::from_secs(1),
            Arc::new(OfflineMode),
        )
        .with_success_rate(0.9)
        .with_categories(&[Network]),
        RecoveryStrategy::new(
            ids::CHUNK_CACHE_CLEAR,
            "Clear script cache",
            "Delete cached script chunks and reload the page",
            Duration::from_secs(3),
            Arc::new(ChunkCacheClear),
        )
        .with_success_rate(0.85)
        .with_categories(&[Render, Unknown]),
        RecoveryStrategy::new(
            ids::APPLICATION_STATE_RESET,
            "Reset application state",
            "Clear store and query caches plus cached session state",
            Duration::from_secs(2),
            Arc::new(ApplicationStateReset),
        )
        .with_success_rate(0.75)
        .with_categories(&[State, Data, Render, Unknown]),
        RecoveryStrategy::new(
            ids::FULL_WIPE,
            "Clear all caches",
            "Wipe cache storage, local and session storage, databases and cookies",
            Duration::from_secs(5),
            Arc::new(FullWipe),
        )
        .with_success_rate(0.95)
        .with_categories(&ErrorCategory::ALL),
    ]
}

/// Reset scoped to one interaction pattern type.
pub fn pattern_reset(pattern_type: impl Into<String>) -> RecoveryStrategy {
    let pattern_type = pattern_type.into();
    RecoveryStrategy::new(
        ids::PATTERN_RESET,
        "Reset interaction pattern",
        format!("Clear stored state for the '{}' pattern", pattern_type),
        Duration::from_secs(1),
        Arc::new(PatternReset { pattern_type }),
    )
    .with_success_rate(0.8)
    .with_categories(&[ErrorCategory::Interaction])
}

/// Reset scoped to one character's component, optionally including that
/// character's progress in `chapter`.
pub fn character_component_reset(
    character: impl Into<String>,
    component: impl Into<String>,
    chapter: Option<u32>,
) -> RecoveryStrategy {
    let character = character.into();
    let component = component.into();
    RecoveryStrategy::new(
        ids::CHARACTER_COMPONENT_RESET,
        "Reset character component",
        format!("Clear stored state for {}'s {}", character, component),
        Duration::from_secs(1),
        Arc::new(CharacterComponentReset {
            character,
            component,
            chapter,
        }),
    )
    .with_success_rate(0.8)
    .with_categories(&[ErrorCategory::Render, ErrorCategory::State])
}

struct ConnectivityTest;

#[async_trait]
impl RecoveryAction for ConnectivityTest {
    async fn run(&self, ctx: &RecoveryContext) -> Result<(), RecoveryError> {
        ctx.platform
            .probe
            .probe(&ctx.config.probe_url, ProbeMode::SameOrigin)
            .await?;
        Ok(())
    }
}

struct DnsRefresh;

#[async_trait]
impl RecoveryAction for DnsRefresh {
    async fn run(&self, ctx: &RecoveryContext) -> Result<(), RecoveryError> {
        let url = cache_busted(&ctx.config.external_probe_url);
        ctx.platform.probe.probe(&url, ProbeMode::NoCors).await?;
        Ok(())
    }
}

fn cache_busted(url: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}_cb={}",
        url,
        separator,
        chrono::Utc::now().timestamp_millis()
    )
}

struct OfflineMode;

#[async_trait]
impl RecoveryAction for OfflineMode {
    async fn run(&self, ctx: &RecoveryContext) -> Result<(), RecoveryError> {
        let worker = ctx
            .platform
            .service_worker
            .as_ref()
            .ok_or_else(|| PlatformError::Unavailable("service worker".to_string()))?;

        worker
            .post_message(ServiceWorkerMessage::EnableOfflineMode {
                message: ctx.config.offline_message.clone(),
            })
            .await?;
        Ok(())
    }
}

struct ChunkCacheClear;

#[async_trait]
impl RecoveryAction for ChunkCacheClear {
    async fn run(&self, ctx: &RecoveryContext) -> Result<(), RecoveryError> {
        let markers = &ctx.config.chunk_cache_markers;
        let mut deleted = 0usize;
        for name in ctx.platform.caches.keys().await? {
            let lowered = name.to_lowercase();
            if markers.iter().any(|marker| lowered.contains(marker.as_str()))
                && ctx.platform.caches.delete(&name).await?
            {
                deleted += 1;
            }
        }
        tracing::debug!(deleted, "cleared script caches");

        if let Some(worker) = &ctx.platform.service_worker {
            worker.update().await?;
            worker.post_message(ServiceWorkerMessage::SkipWaiting).await?;
        }

        ctx.platform.page.reload();
        Ok(())
    }
}

struct ApplicationStateReset;

#[async_trait]
impl RecoveryAction for ApplicationStateReset {
    async fn run(&self, ctx: &RecoveryContext) -> Result<(), RecoveryError> {
        let local = ctx.platform.local.as_ref();
        let session = ctx.platform.session.as_ref();

        remove_keys(local, &ctx.config.local_state_keys)?;
        remove_keys(session, &ctx.config.session_state_keys)?;
        remove_prefixed(local, &ctx.config.state_cache_prefixes)?;
        remove_prefixed(session, &ctx.config.state_cache_prefixes)?;

        ctx.resets.emit(ResetEvent::Application);
        Ok(())
    }
}

fn remove_keys(store: &dyn KeyValueStore, keys: &[String]) -> Result<(), RecoveryError> {
    for key in keys {
        store.remove(key)?;
    }
    Ok(())
}

struct PatternReset {
    pattern_type: String,
}

#[async_trait]
impl RecoveryAction for PatternReset {
    async fn run(&self, ctx: &RecoveryContext) -> Result<(), RecoveryError> {
        let prefixes = [
            format!("pattern_state_{}", self.pattern_type),
            format!("pattern_{}_", self.pattern_type),
        ];
        let mut removed = remove_prefixed(ctx.platform.local.as_ref(), &prefixes)?;
        removed.extend(remove_prefixed(ctx.platform.session.as_ref(), &prefixes)?);
        tracing::debug!(pattern = %self.pattern_type, removed = removed.len(), "pattern state cleared");

        ctx.resets.emit(ResetEvent::Pattern {
            pattern_type: self.pattern_type.clone(),
        });
        Ok(())
    }
}

struct CharacterComponentReset {
    character: String,
    component: String,
    chapter: Option<u32>,
}

#[async_trait]
impl RecoveryAction for CharacterComponentReset {
    async fn run(&self, ctx: &RecoveryContext) -> Result<(), RecoveryError> {
        // Trailing separator keeps `carmen_resume` off `carmen_resumeHistory`
        let prefixes = [format!("{}_{}_", self.character, self.component)];
        remove_prefixed(ctx.platform.local.as_ref(), &prefixes)?;
        remove_prefixed(ctx.platform.session.as_ref(), &prefixes)?;

        if let Some(chapter) = self.chapter {
            let key = format!("chapter_{}_{}_progress", chapter, self.character);
            ctx.platform.local.remove(&key)?;
            ctx.platform.session.remove(&key)?;
        }

        ctx.resets.emit(ResetEvent::CharacterComponent {
            character: self.character.clone(),
            component: self.component.clone(),
        });
        Ok(())
    }
}

struct FullWipe;

#[async_trait]
impl RecoveryAction for FullWipe {
    async fn run(&self, ctx: &RecoveryContext) -> Result<(), RecoveryError> {
        let platform = &ctx.platform;

        for name in platform.caches.keys().await? {
            platform.caches.delete(&name).await?;
        }

        platform.local.clear()?;
        platform.session.clear()?;

        for name in platform.databases.names().await? {
            platform.databases.delete(&name).await?;
        }

        for name in platform.cookies.names() {
            platform.cookies.expire(&name);
        }
        Ok(())
    }
}
