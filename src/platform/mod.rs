//! Platform capability interfaces.
//!
//! Everything the resilience services need from the host environment (cache
//! storage, indexed databases, cookies, service worker, page reload,
//! connectivity probing and network information) sits behind a small trait.
//! The [`headless`] module provides in-memory implementations used outside a
//! browser and in tests.

pub mod headless;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{KeyValueStore, MemoryStore};

pub use headless::{
    HeadlessPage, HeadlessServiceWorker, MemoryCacheStorage, MemoryCookieJar,
    MemoryDocumentDatabases, StaticNetworkInformation, StaticProbe,
};

/// Errors reported by platform capabilities.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The capability does not exist in this environment.
    #[error("{0} is not available")]
    Unavailable(String),

    /// The capability exists but the operation failed.
    #[error("{capability} failed: {reason}")]
    Failed { capability: String, reason: String },
}

impl PlatformError {
    /// Convenience constructor for [`PlatformError::Failed`].
    pub fn failed(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            capability: capability.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// How a connectivity probe is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// `HEAD` request against the application's own origin; the status must be 2xx.
    SameOrigin,
    /// Opaque cross-origin request; any response at all counts as reachable.
    NoCors,
}

/// Checks whether a URL is reachable.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Probes `url`, returning an error if it could not be reached.
    async fn probe(&self, url: &str, mode: ProbeMode) -> PlatformResult<()>;
}

/// Effective connection type as reported by the network information signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectiveType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
    Unknown,
}

/// Snapshot of the host's network information.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Effective connection type.
    pub effective_type: EffectiveType,
    /// Estimated downlink bandwidth in Mbps, if reported.
    pub downlink_mbps: Option<f64>,
}

impl ConnectionInfo {
    pub fn new(effective_type: EffectiveType, downlink_mbps: Option<f64>) -> Self {
        Self {
            effective_type,
            downlink_mbps,
        }
    }
}

/// Source of the current connection estimate.
pub trait NetworkInformation: Send + Sync {
    /// Returns the current connection info, or `None` if the host does not expose it.
    fn snapshot(&self) -> Option<ConnectionInfo>;
}

/// Named cache storage (the content-addressable cache API).
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Lists cache names.
    async fn keys(&self) -> PlatformResult<Vec<String>>;
    /// Deletes a cache; returns whether it existed.
    async fn delete(&self, name: &str) -> PlatformResult<bool>;
}

/// Indexed document databases.
#[async_trait]
pub trait DocumentDatabases: Send + Sync {
    /// Lists database names.
    async fn names(&self) -> PlatformResult<Vec<String>>;
    /// Deletes a database.
    async fn delete(&self, name: &str) -> PlatformResult<()>;
}

/// Cookie storage for the current origin.
pub trait CookieJar: Send + Sync {
    /// Lists cookie names.
    fn names(&self) -> Vec<String>;
    /// Expires a cookie.
    fn expire(&self, name: &str);
}

/// Messages understood by the background service worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceWorkerMessage {
    /// Switch the worker into offline mode, serving cached content.
    EnableOfflineMode { message: String },
    /// Drop cached scripts and activate the waiting worker.
    SkipWaiting,
}

/// Registered background service worker.
#[async_trait]
pub trait ServiceWorker: Send + Sync {
    /// Posts a message to the active worker.
    async fn post_message(&self, message: ServiceWorkerMessage) -> PlatformResult<()>;
    /// Checks the server for an updated worker script.
    async fn update(&self) -> PlatformResult<()>;
}

/// Control over the hosting page.
pub trait PageController: Send + Sync {
    /// Requests a full page reload.
    fn reload(&self);
}

/// The full set of capabilities handed to recovery strategies.
#[derive(Clone)]
pub struct Platform {
    /// Persistent local storage.
    pub local: Arc<dyn KeyValueStore>,
    /// Per-session storage.
    pub session: Arc<dyn KeyValueStore>,
    /// Named cache storage.
    pub caches: Arc<dyn CacheStorage>,
    /// Indexed document databases.
    pub databases: Arc<dyn DocumentDatabases>,
    /// Cookie storage.
    pub cookies: Arc<dyn CookieJar>,
    /// Service worker, when one is registered.
    pub service_worker: Option<Arc<dyn ServiceWorker>>,
    /// Page reload control.
    pub page: Arc<dyn PageController>,
    /// Connectivity probe.
    pub probe: Arc<dyn ConnectivityProbe>,
}

impl Platform {
    /// A platform backed entirely by in-memory fakes, with no service worker
    /// and a probe that always succeeds.
    pub fn headless() -> Self {
        Self {
            local: Arc::new(MemoryStore::new()),
            session: Arc::new(MemoryStore::new()),
            caches: Arc::new(MemoryCacheStorage::new()),
            databases: Arc::new(MemoryDocumentDatabases::new()),
            cookies: Arc::new(MemoryCookieJar::new()),
            service_worker: None,
            page: Arc::new(HeadlessPage::new()),
            probe: Arc::new(StaticProbe::reachable()),
        }
    }

    /// Replaces the local and session stores.
    pub fn with_stores(
        mut self,
        local: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
    ) -> Self {
        self.local = local;
        self.session = session;
        self
    }

    /// Replaces the connectivity probe.
    pub fn with_probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Registers a service worker.
    pub fn with_service_worker(mut self, worker: Arc<dyn ServiceWorker>) -> Self {
        self.service_worker = Some(worker);
        self
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("local", &self.local)
            .field("session", &self.session)
            .field("service_worker", &self.service_worker.is_some())
            .finish_non_exhaustive()
    }
}
