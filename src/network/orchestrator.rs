//! Request orchestration: retry, backoff, offline queue and replay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;

use super::{
    random_jitter, ConnectionQuality, FailedAttempt, HttpConnectivityProbe, HttpResponse,
    HttpTransport, JitterSource, NetworkError, NetworkErrorClassifier, NetworkErrorKind,
    ReqwestTransport, RequestSpec, RetryConfig, RetryOverrides, TransportError,
};
use crate::config::NetworkConfig;
use crate::events::{PlatformSignal, SignalHub};
use crate::platform::{
    ConnectionInfo, ConnectivityProbe, NetworkInformation, ProbeMode, StaticNetworkInformation,
};
use crate::store::{KeyValueStore, MemoryStore};
use crate::tasks::BackgroundTasks;

/// Bookkeeping for a request whose last attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequestAttempt {
    pub url: String,
    pub method: String,
    pub timestamp: DateTime<Utc>,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
struct QueuedRequest {
    spec: RequestSpec,
    queued_at: DateTime<Utc>,
}

/// Snapshot of the orchestrator state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub online: bool,
    pub quality: ConnectionQuality,
    pub failed_requests: usize,
    pub queued_requests: usize,
}

/// Result of replaying one queued request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub signature: String,
    pub url: String,
    pub status: Option<u16>,
    pub error: Option<String>,
}

/// Result of draining the offline queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub replayed: Vec<ReplayOutcome>,
    /// Older entries superseded by a later one for the same request.
    pub discarded: usize,
}

/// Builder for [`NetworkOrchestrator`].
pub struct NetworkOrchestratorBuilder {
    config: NetworkConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    network_info: Option<Arc<dyn NetworkInformation>>,
    local: Option<Arc<dyn KeyValueStore>>,
    classifier: NetworkErrorClassifier,
    jitter: JitterSource,
    online: bool,
}

impl NetworkOrchestratorBuilder {
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn network_information(mut self, info: Arc<dyn NetworkInformation>) -> Self {
        self.network_info = Some(info);
        self
    }

    /// Local storage holding the auth blob used by function invocations.
    pub fn local_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.local = Some(store);
        self
    }

    pub fn classifier(mut self, classifier: NetworkErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn jitter(mut self, jitter: JitterSource) -> Self {
        self.jitter = jitter;
        self
    }

    /// Initial value of the online flag (defaults to online).
    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    /// Builds the orchestrator, creating a `reqwest` client for any missing
    /// transport or probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn build(self) -> Result<NetworkOrchestrator, TransportError> {
        let mut client: Option<Client> = None;
        let mut shared_client = || -> Result<Client, TransportError> {
            if let Some(client) = &client {
                return Ok(client.clone());
            }
            let built = Client::builder().build().map_err(|e| {
                TransportError::new(format!("Failed to create HTTP client: {}", e))
            })?;
            client = Some(built.clone());
            Ok(built)
        };

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::with_client(shared_client()?)),
        };
        let probe: Arc<dyn ConnectivityProbe> = match self.probe {
            Some(probe) => probe,
            None => Arc::new(HttpConnectivityProbe::new(shared_client()?)),
        };
        let network_info = self
            .network_info
            .unwrap_or_else(|| Arc::new(StaticNetworkInformation::new(None)));
        let quality = ConnectionQuality::assess(network_info.snapshot());

        Ok(NetworkOrchestrator {
            inner: Arc::new(OrchestratorInner {
                default_retry: RetryConfig::from(&self.config.retry),
                config: self.config,
                transport,
                probe,
                network_info,
                local: self.local.unwrap_or_else(|| Arc::new(MemoryStore::new())),
                classifier: self.classifier,
                jitter: self.jitter,
                online: AtomicBool::new(self.online),
                quality: RwLock::new(quality),
                failed: Mutex::new(HashMap::new()),
                queue: Mutex::new(HashMap::new()),
                superseded: AtomicUsize::new(0),
                tasks: BackgroundTasks::new(),
            }),
        })
    }
}

pub(crate) struct OrchestratorInner {
    pub(crate) config: NetworkConfig,
    default_retry: RetryConfig,
    transport: Arc<dyn HttpTransport>,
    probe: Arc<dyn ConnectivityProbe>,
    network_info: Arc<dyn NetworkInformation>,
    pub(crate) local: Arc<dyn KeyValueStore>,
    classifier: NetworkErrorClassifier,
    jitter: JitterSource,
    online: AtomicBool,
    quality: RwLock<ConnectionQuality>,
    failed: Mutex<HashMap<String, NetworkRequestAttempt>>,
    queue: Mutex<HashMap<String, QueuedRequest>>,
    superseded: AtomicUsize,
    tasks: BackgroundTasks,
}

/// Network resilience service. Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct NetworkOrchestrator {
    pub(crate) inner: Arc<OrchestratorInner>,
}

impl std::fmt::Debug for NetworkOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkOrchestrator")
            .field("status", &self.network_status())
            .finish_non_exhaustive()
    }
}

impl NetworkOrchestrator {
    pub fn builder(config: NetworkConfig) -> NetworkOrchestratorBuilder {
        NetworkOrchestratorBuilder {
            config,
            transport: None,
            probe: None,
            network_info: None,
            local: None,
            classifier: NetworkErrorClassifier::new(),
            jitter: random_jitter(),
            online: true,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.inner.config
    }

    /// Starts the periodic connection-quality check and, when a hub is
    /// given, reacts to online, offline and connection-change signals.
    pub fn start(&self, signals: Option<&SignalHub>) {
        let orchestrator = self.clone();
        self.inner.tasks.spawn_periodic(
            "connection-quality",
            self.inner.config.quality_check_interval(),
            move || {
                let orchestrator = orchestrator.clone();
                async move {
                    orchestrator.reassess_connection();
                }
            },
        );

        if let Some(hub) = signals {
            let orchestrator = self.clone();
            self.inner
                .tasks
                .spawn_listener("network-signals", hub.subscribe(), move |signal| {
                    let orchestrator = orchestrator.clone();
                    async move {
                        orchestrator.handle_signal(signal).await;
                    }
                });
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.tasks.len() > 0
    }

    /// Cancels the timers and signal listener.
    pub async fn shutdown(&self) {
        self.inner.tasks.shutdown().await;
    }

    /// Reacts to a host signal.
    pub async fn handle_signal(&self, signal: PlatformSignal) {
        match signal {
            PlatformSignal::Online => {
                self.go_online().await;
            }
            PlatformSignal::Offline => self.set_online(false),
            PlatformSignal::ConnectionChange(info) => {
                self.update_connection(Some(info));
            }
            PlatformSignal::Unload => {}
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Sets the online flag without replaying the queue.
    pub fn set_online(&self, online: bool) {
        let was = self.inner.online.swap(online, Ordering::SeqCst);
        if was != online {
            tracing::info!(online, "network status changed");
        }
    }

    /// Marks the host online and replays the offline queue.
    pub async fn go_online(&self) -> ReplayReport {
        self.set_online(true);
        self.replay_queued().await
    }

    pub fn connection_quality(&self) -> ConnectionQuality {
        self.inner
            .quality
            .read()
            .map(|q| *q)
            .unwrap_or_default()
    }

    /// Re-reads network information and updates the quality estimate.
    pub fn reassess_connection(&self) -> ConnectionQuality {
        let info = self.inner.network_info.snapshot();
        self.update_connection(info)
    }

    fn update_connection(&self, info: Option<ConnectionInfo>) -> ConnectionQuality {
        let quality = ConnectionQuality::assess(info);
        if let Ok(mut current) = self.inner.quality.write() {
            if *current != quality {
                tracing::debug!(from = %*current, to = %quality, "connection quality changed");
            }
            *current = quality;
        }
        quality
    }

    /// Issues `spec` with timeout, retry and offline handling.
    ///
    /// Retries of one request run strictly one after another. A response
    /// whose status does not satisfy the retry condition is returned as is,
    /// even when it is not a success.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the last attempt once `max_retries`
    /// attempts have been made, the failure is not retryable, or the host is offline (in
    /// which case the request is also queued for replay).
    pub async fn handle_request(
        &self,
        spec: RequestSpec,
        overrides: Option<RetryOverrides>,
    ) -> Result<HttpResponse, NetworkError> {
        let retry = match &overrides {
            Some(overrides) => self.inner.default_retry.merged(overrides),
            None => self.inner.default_retry.clone(),
        };
        let signature = spec.signature();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let quality = self.connection_quality();
            let timeout = quality.timeout(&self.inner.config.timeouts);

            let (status, transport_error) =
                match tokio::time::timeout(timeout, self.inner.transport.send(&spec)).await {
                    Ok(Ok(response)) if !retry.should_retry(Some(response.status)) => {
                        if response.is_success() {
                            self.clear_failure(&signature);
                        }
                        return Ok(response);
                    }
                    Ok(Ok(response)) => (Some(response.status), None),
                    Ok(Err(err)) => (None, Some(err)),
                    Err(_) => (None, Some(TransportError::timeout(timeout))),
                };

            let online = self.is_online();
            let attempt = FailedAttempt {
                online,
                status,
                transport: transport_error.as_ref(),
            };
            let kind = self.inner.classifier.classify(&attempt);
            let mut error = NetworkError::new(kind, spec.url.clone(), attempt.message());
            error.status = status;
            error.attempts = attempts;
            error.retries = attempts - 1;

            self.record_failure(&signature, &spec, attempts);

            if kind == NetworkErrorKind::Offline {
                self.enqueue(signature, spec);
                error.queued = true;
                tracing::info!(url = %error.url, "request queued until back online");
                return Err(error);
            }

            let may_retry = kind.is_retryable() && online && retry.should_retry(status);
            if may_retry && attempts < retry.max_retries {
                let delay = retry.delay(attempts, (self.inner.jitter)(), quality);
                tracing::debug!(
                    url = %spec.url,
                    kind = %kind,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            tracing::warn!(
                url = %error.url,
                kind = %kind,
                attempts,
                "request failed: {}",
                error.message
            );
            return Err(error);
        }
    }

    fn record_failure(&self, signature: &str, spec: &RequestSpec, attempts: u32) {
        if let Ok(mut failed) = self.inner.failed.lock() {
            failed.insert(
                signature.to_string(),
                NetworkRequestAttempt {
                    url: spec.url.clone(),
                    method: spec.method.to_string(),
                    timestamp: Utc::now(),
                    attempts,
                },
            );
        }
    }

    fn clear_failure(&self, signature: &str) {
        if let Ok(mut failed) = self.inner.failed.lock() {
            failed.remove(signature);
        }
    }

    /// Queues `spec` for replay, replacing any entry with the same signature.
    fn enqueue(&self, signature: String, spec: RequestSpec) {
        let Ok(mut queue) = self.inner.queue.lock() else {
            tracing::warn!("offline queue lock poisoned, request not queued");
            return;
        };
        let entry = QueuedRequest {
            spec,
            queued_at: Utc::now(),
        };
        if let Some(previous) = queue.insert(signature, entry) {
            self.inner.superseded.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(url = %previous.spec.url, "superseded queued request");
        }
    }

    /// Failure bookkeeping for a request signature.
    pub fn failed_request(&self, signature: &str) -> Option<NetworkRequestAttempt> {
        self.inner
            .failed
            .lock()
            .ok()
            .and_then(|failed| failed.get(signature).cloned())
    }

    /// Number of distinct requests waiting for replay.
    pub fn queued_len(&self) -> usize {
        self.inner.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Replays every queued request and empties the queue.
    ///
    /// Replays run concurrently across signatures.
    pub async fn replay_queued(&self) -> ReplayReport {
        let (drained, discarded) = match self.inner.queue.lock() {
            Ok(mut queue) => (
                std::mem::take(&mut *queue),
                self.inner.superseded.swap(0, Ordering::SeqCst),
            ),
            Err(_) => (HashMap::new(), 0),
        };

        let latest: Vec<(String, RequestSpec)> = drained
            .into_iter()
            .map(|(signature, queued)| {
                tracing::debug!(
                    url = %queued.spec.url,
                    queued_at = %queued.queued_at,
                    "replaying queued request"
                );
                (signature, queued.spec)
            })
            .collect();

        let replays = latest.into_iter().map(|(signature, spec)| {
            let url = spec.url.clone();
            async move {
                let result = self.handle_request(spec, None).await;
                match result {
                    Ok(response) => ReplayOutcome {
                        signature,
                        url,
                        status: Some(response.status),
                        error: None,
                    },
                    Err(err) => ReplayOutcome {
                        signature,
                        url,
                        status: err.status,
                        error: Some(err.to_string()),
                    },
                }
            }
        });
        let replayed = futures::future::join_all(replays).await;

        if !replayed.is_empty() {
            tracing::info!(count = replayed.len(), discarded, "replayed queued requests");
        }

        ReplayReport {
            replayed,
            discarded,
        }
    }

    /// Probes connectivity and, when reachable, goes back online and replays
    /// the queue.
    ///
    /// Tries a same-origin `HEAD` first and falls back to a no-cors probe of
    /// an external resource. Returns whether connectivity was restored.
    pub async fn attempt_recovery(&self) -> bool {
        let probe = &self.inner.probe;
        let same_origin = probe
            .probe(&self.inner.config.probe_url, ProbeMode::SameOrigin)
            .await;

        let reachable = match same_origin {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "same-origin probe failed, trying external");
                probe
                    .probe(&self.inner.config.external_probe_url, ProbeMode::NoCors)
                    .await
                    .is_ok()
            }
        };

        if reachable {
            self.go_online().await;
        } else {
            tracing::warn!("network recovery failed: no probe succeeded");
        }
        reachable
    }

    pub fn network_status(&self) -> NetworkStatus {
        NetworkStatus {
            online: self.is_online(),
            quality: self.connection_quality(),
            failed_requests: self.inner.failed.lock().map(|f| f.len()).unwrap_or(0),
            queued_requests: self.queued_len(),
        }
    }
}
