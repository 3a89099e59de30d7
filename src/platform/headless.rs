//! In-memory capability implementations for non-browser environments.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use super::{
    CacheStorage, ConnectionInfo, ConnectivityProbe, CookieJar, DocumentDatabases,
    NetworkInformation, PageController, PlatformError, PlatformResult, ProbeMode, ServiceWorker,
    ServiceWorkerMessage,
};

fn lock_poisoned(capability: &str) -> PlatformError {
    PlatformError::failed(capability, "lock poisoned")
}

/// Probe whose answer is set by the caller, per mode.
#[derive(Debug)]
pub struct StaticProbe {
    same_origin: AtomicBool,
    no_cors: AtomicBool,
    calls: Mutex<Vec<(String, ProbeMode)>>,
}

impl StaticProbe {
    /// Probe where both modes succeed.
    pub fn reachable() -> Self {
        Self::new(true, true)
    }

    /// Probe where both modes fail.
    pub fn unreachable() -> Self {
        Self::new(false, false)
    }

    pub fn new(same_origin: bool, no_cors: bool) -> Self {
        Self {
            same_origin: AtomicBool::new(same_origin),
            no_cors: AtomicBool::new(no_cors),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Changes the answer for both modes.
    pub fn set_reachable(&self, reachable: bool) {
        self.same_origin.store(reachable, Ordering::SeqCst);
        self.no_cors.store(reachable, Ordering::SeqCst);
    }

    /// URLs probed so far, in order.
    pub fn calls(&self) -> Vec<(String, ProbeMode)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn probe(&self, url: &str, mode: ProbeMode) -> PlatformResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((url.to_string(), mode));
        }

        let reachable = match mode {
            ProbeMode::SameOrigin => self.same_origin.load(Ordering::SeqCst),
            ProbeMode::NoCors => self.no_cors.load(Ordering::SeqCst),
        };

        if reachable {
            Ok(())
        } else {
            Err(PlatformError::failed("connectivity probe", format!("{} unreachable", url)))
        }
    }
}

/// Network information with a caller-controlled snapshot.
#[derive(Debug, Default)]
pub struct StaticNetworkInformation {
    info: RwLock<Option<ConnectionInfo>>,
}

impl StaticNetworkInformation {
    pub fn new(info: Option<ConnectionInfo>) -> Self {
        Self {
            info: RwLock::new(info),
        }
    }

    pub fn set(&self, info: Option<ConnectionInfo>) {
        if let Ok(mut current) = self.info.write() {
            *current = info;
        }
    }
}

impl NetworkInformation for StaticNetworkInformation {
    fn snapshot(&self) -> Option<ConnectionInfo> {
        self.info.read().ok().and_then(|info| *info)
    }
}

/// Cache storage holding only cache names.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    names: Mutex<BTreeSet<String>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caches<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Mutex::new(names.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn keys(&self) -> PlatformResult<Vec<String>> {
        let names = self.names.lock().map_err(|_| lock_poisoned("cache storage"))?;
        Ok(names.iter().cloned().collect())
    }

    async fn delete(&self, name: &str) -> PlatformResult<bool> {
        let mut names = self.names.lock().map_err(|_| lock_poisoned("cache storage"))?;
        Ok(names.remove(name))
    }
}

/// Indexed databases tracked by name only.
#[derive(Debug, Default)]
pub struct MemoryDocumentDatabases {
    names: Mutex<BTreeSet<String>>,
}

impl MemoryDocumentDatabases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_databases<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Mutex::new(names.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl DocumentDatabases for MemoryDocumentDatabases {
    async fn names(&self) -> PlatformResult<Vec<String>> {
        let names = self.names.lock().map_err(|_| lock_poisoned("indexed databases"))?;
        Ok(names.iter().cloned().collect())
    }

    async fn delete(&self, name: &str) -> PlatformResult<()> {
        let mut names = self.names.lock().map_err(|_| lock_poisoned("indexed databases"))?;
        names.remove(name);
        Ok(())
    }
}

/// Cookie jar tracked by cookie name.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    names: Mutex<BTreeSet<String>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookies<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Mutex::new(names.into_iter().map(Into::into).collect()),
        }
    }
}

impl CookieJar for MemoryCookieJar {
    fn names(&self) -> Vec<String> {
        self.names
            .lock()
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn expire(&self, name: &str) {
        if let Ok(mut names) = self.names.lock() {
            names.remove(name);
        }
    }
}

/// Service worker that records the messages it receives.
#[derive(Debug, Default)]
pub struct HeadlessServiceWorker {
    messages: Mutex<Vec<ServiceWorkerMessage>>,
    updates: AtomicUsize,
}

impl HeadlessServiceWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<ServiceWorkerMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceWorker for HeadlessServiceWorker {
    async fn post_message(&self, message: ServiceWorkerMessage) -> PlatformResult<()> {
        let mut messages = self.messages.lock().map_err(|_| lock_poisoned("service worker"))?;
        messages.push(message);
        Ok(())
    }

    async fn update(&self) -> PlatformResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Page controller that counts reload requests.
#[derive(Debug, Default)]
pub struct HeadlessPage {
    reloads: AtomicUsize,
}

impl HeadlessPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl PageController for HeadlessPage {
    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("page reload requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::EffectiveType;

    #[tokio::test]
    async fn test_static_probe_records_calls() {
        let probe = StaticProbe::new(false, true);

        assert!(probe.probe("/favicon.ico", ProbeMode::SameOrigin).await.is_err());
        assert!(probe.probe("https://example.com", ProbeMode::NoCors).await.is_ok());

        let calls = probe.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, ProbeMode::SameOrigin);
    }

    #[tokio::test]
    async fn test_cache_storage_delete() {
        let caches = MemoryCacheStorage::with_caches(["static-v1", "chunks-v1"]);
        assert!(caches.delete("chunks-v1").await.unwrap());
        assert!(!caches.delete("chunks-v1").await.unwrap());
        assert_eq!(caches.keys().await.unwrap(), vec!["static-v1".to_string()]);
    }

    #[test]
    fn test_network_information_set() {
        let info = StaticNetworkInformation::new(None);
        assert!(info.snapshot().is_none());

        info.set(Some(ConnectionInfo::new(EffectiveType::ThreeG, Some(1.2))));
        assert_eq!(info.snapshot().unwrap().effective_type, EffectiveType::ThreeG);
    }

    #[test]
    fn test_cookie_jar_expire() {
        let jar = MemoryCookieJar::with_cookies(["sb-access", "theme"]);
        jar.expire("theme");
        assert_eq!(jar.names(), vec!["sb-access".to_string()]);
    }
}
