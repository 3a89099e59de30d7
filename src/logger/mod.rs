//! Error capture, queueing and persistence.
//!
//! [`ErrorLogger`] turns [`ErrorDetails`] into classified [`ErrorRecord`]s,
//! keeps them in a bounded in-memory queue, persists them to a bounded log in
//! local storage and periodically forwards batches to the configured sinks.
//!
//! Logging never fails from the caller's point of view: storage and sink
//! problems are reported through `tracing` warnings only.
//!
//! # Example
//!
//! ```no_run
//! use lyra_resilience::config::LoggerConfig;
//! use lyra_resilience::error::ErrorDetails;
//! use lyra_resilience::logger::ErrorLogger;
//!
//! # async fn run() {
//! let logger = ErrorLogger::builder(LoggerConfig::default()).build();
//! let record = logger
//!     .log_error(ErrorDetails::new("Failed to fetch lesson", "LessonView"))
//!     .await;
//! println!("{} -> {}", record.error_id, record.category);
//! # }
//! ```

pub mod console;
pub mod sink;

pub use console::{ConsoleReporter, SeverityTheme};
pub use sink::{AnalyticsSink, ErrorSink, SinkError, TrackingSink};

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::LoggerConfig;
use crate::error::{ErrorCategory, ErrorClassifier, ErrorDetails, ErrorRecord, Severity};
use crate::events::{PlatformSignal, SignalHub};
use crate::store::{self, KeyValueStore, MemoryStore};
use crate::tasks::BackgroundTasks;

/// Client metadata stamped on records that do not carry their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub user_agent: String,
    pub url: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            user_agent: format!("lyra-resilience/{}", env!("CARGO_PKG_VERSION")),
            url: "unknown".to_string(),
        }
    }
}

/// Aggregate view over persisted and queued records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub total: usize,
    pub by_category: BTreeMap<ErrorCategory, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    /// Most recent records, newest first.
    pub recent: Vec<ErrorRecord>,
}

/// Result of a single flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The queue was empty.
    Empty,
    /// Every sink accepted this many records.
    Delivered(usize),
    /// A sink failed and this many records went back to the queue.
    Requeued(usize),
}

/// Builder for [`ErrorLogger`].
pub struct ErrorLoggerBuilder {
    config: LoggerConfig,
    classifier: ErrorClassifier,
    local: Option<Arc<dyn KeyValueStore>>,
    session: Option<Arc<dyn KeyValueStore>>,
    sinks: Vec<Arc<dyn ErrorSink>>,
    client: ClientInfo,
    console: Option<ConsoleReporter>,
}

impl ErrorLoggerBuilder {
    /// Local storage holding the persisted log and the auth blob.
    pub fn local_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.local = Some(store);
        self
    }

    /// Session storage holding the session identifier.
    pub fn session_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.session = Some(store);
        self
    }

    /// Adds a sink. When no sink is added the tracking and analytics stubs are used.
    pub fn sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn client_info(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    /// Overrides the console reporter used in development mode.
    pub fn console(mut self, console: ConsoleReporter) -> Self {
        self.console = Some(console);
        self
    }

    pub fn build(self) -> ErrorLogger {
        let sinks = if self.sinks.is_empty() {
            vec![
                Arc::new(TrackingSink) as Arc<dyn ErrorSink>,
                Arc::new(AnalyticsSink) as Arc<dyn ErrorSink>,
            ]
        } else {
            self.sinks
        };

        let console = if self.config.development_mode {
            Some(self.console.unwrap_or_default())
        } else {
            None
        };

        ErrorLogger {
            inner: Arc::new(LoggerInner {
                queue: Mutex::new(VecDeque::with_capacity(self.config.queue_capacity)),
                config: self.config,
                classifier: self.classifier,
                local: self.local.unwrap_or_else(|| Arc::new(MemoryStore::new())),
                session: self.session.unwrap_or_else(|| Arc::new(MemoryStore::new())),
                sinks,
                client: self.client,
                console,
                tasks: BackgroundTasks::new(),
            }),
        }
    }
}

struct LoggerInner {
    config: LoggerConfig,
    classifier: ErrorClassifier,
    local: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    sinks: Vec<Arc<dyn ErrorSink>>,
    client: ClientInfo,
    console: Option<ConsoleReporter>,
    queue: Mutex<VecDeque<ErrorRecord>>,
    tasks: BackgroundTasks,
}

/// Error classifier and logger service. Cloning yields another handle to the
/// same queue.
#[derive(Clone)]
pub struct ErrorLogger {
    inner: Arc<LoggerInner>,
}

impl std::fmt::Debug for ErrorLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorLogger")
            .field("config", &self.inner.config)
            .field("queued", &self.queued_len())
            .field("sinks", &self.inner.sinks.len())
            .finish_non_exhaustive()
    }
}

impl ErrorLogger {
    pub fn builder(config: LoggerConfig) -> ErrorLoggerBuilder {
        ErrorLoggerBuilder {
            config,
            classifier: ErrorClassifier::new(),
            local: None,
            session: None,
            sinks: Vec::new(),
            client: ClientInfo::default(),
            console: None,
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.inner.config
    }

    /// Starts the periodic flush timer and, when a hub is given, flushes on
    /// every page-unload signal.
    pub fn start(&self, signals: Option<&SignalHub>) {
        let period = self.inner.config.flush_interval();
        let logger = self.clone();
        self.inner.tasks.spawn_periodic("error-flush", period, move || {
            let logger = logger.clone();
            async move {
                logger.flush().await;
            }
        });

        if let Some(hub) = signals {
            let logger = self.clone();
            self.inner
                .tasks
                .spawn_listener("error-unload", hub.subscribe(), move |signal| {
                    let logger = logger.clone();
                    async move {
                        if signal == PlatformSignal::Unload {
                            logger.flush().await;
                        }
                    }
                });
        }

        tracing::debug!(
            flush_interval_ms = self.inner.config.flush_interval_ms,
            "error logger started"
        );
    }

    /// Returns true while background tasks are running.
    pub fn is_running(&self) -> bool {
        self.inner.tasks.len() > 0
    }

    /// Stops the timers and drains the queue through the sinks.
    ///
    /// Draining stops early if a sink keeps failing; the remaining records are
    /// still in the persisted log.
    pub async fn shutdown(&self) {
        self.inner.tasks.shutdown().await;

        loop {
            match self.flush().await {
                FlushOutcome::Delivered(_) => continue,
                FlushOutcome::Empty => break,
                FlushOutcome::Requeued(count) => {
                    tracing::warn!(count, "shutdown left records undelivered");
                    break;
                }
            }
        }
    }

    /// Captures, classifies, queues and persists one failure.
    ///
    /// Never fails. A critical record triggers an immediate flush before this
    /// returns.
    pub async fn log_error(&self, details: ErrorDetails) -> ErrorRecord {
        let details = self.enrich(details);
        let classification = self.inner.classifier.classify(&details);
        let record = ErrorRecord::new(details, classification);

        self.enqueue(record.clone());
        self.persist(&record);
        self.trace(&record);

        if let Some(console) = &self.inner.console {
            console.report(&record);
        }

        if record.severity == Severity::Critical {
            self.flush().await;
        }

        record
    }

    fn enrich(&self, mut details: ErrorDetails) -> ErrorDetails {
        let now = Utc::now();
        details.timestamp.get_or_insert(now);
        if details.error_id.is_none() {
            details.error_id = Some(generate_id("err", now.timestamp_millis()));
        }
        if details.user_agent.is_none() {
            details.user_agent = Some(self.inner.client.user_agent.clone());
        }
        if details.url.is_none() {
            details.url = Some(self.inner.client.url.clone());
        }
        if details.session_id.is_none() {
            details.session_id = self.session_id();
        }
        if details.user_id.is_none() {
            details.user_id = Some(self.user_id());
        }
        details
    }

    /// Stable id for the current session, created on first use.
    pub fn session_id(&self) -> Option<String> {
        let key = self.inner.config.session_key.as_str();
        match self.inner.session.get(key) {
            Ok(Some(id)) => Some(id),
            Ok(None) => {
                let id = generate_id("session", Utc::now().timestamp_millis());
                if let Err(e) = self.inner.session.set(key, &id) {
                    tracing::warn!(error = %e, "failed to store session id");
                }
                Some(id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read session id");
                None
            }
        }
    }

    /// User id from the stored auth blob, or `"anonymous"`.
    pub fn user_id(&self) -> String {
        let raw = match self.inner.local.get(&self.inner.config.auth_storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return "anonymous".to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read auth token");
                return "anonymous".to_string();
            }
        };

        serde_json::from_str::<serde_json::Value>(&raw)
            .ok()
            .and_then(|blob| {
                ["/user/id", "/currentSession/user/id", "/session/user/id"]
                    .iter()
                    .find_map(|pointer| blob.pointer(pointer).and_then(|v| v.as_str()))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "anonymous".to_string())
    }

    fn enqueue(&self, record: ErrorRecord) {
        let capacity = self.inner.config.queue_capacity;
        let Ok(mut queue) = self.inner.queue.lock() else {
            tracing::warn!("error queue lock poisoned, record not queued");
            return;
        };

        queue.push_back(record);
        while queue.len() > capacity {
            if let Some(dropped) = queue.pop_front() {
                tracing::debug!(error_id = %dropped.error_id, "error queue full, dropped oldest");
            }
        }
    }

    fn persist(&self, record: &ErrorRecord) {
        let result = store::push_bounded(
            self.inner.local.as_ref(),
            &self.inner.config.storage_key,
            record.clone(),
            self.inner.config.persisted_capacity,
        );
        if let Err(e) = result {
            tracing::warn!(error = %e, error_id = %record.error_id, "failed to persist error record");
        }
    }

    fn trace(&self, record: &ErrorRecord) {
        match record.severity {
            Severity::Critical | Severity::High => tracing::error!(
                error_id = %record.error_id,
                category = %record.category,
                severity = %record.severity,
                context = %record.context,
                recoverable = record.recoverable,
                "{}",
                record.message
            ),
            Severity::Medium => tracing::warn!(
                error_id = %record.error_id,
                category = %record.category,
                context = %record.context,
                "{}",
                record.message
            ),
            Severity::Low => tracing::info!(
                error_id = %record.error_id,
                category = %record.category,
                context = %record.context,
                "{}",
                record.message
            ),
        }
    }

    /// Drains up to one batch and forwards it to every sink.
    ///
    /// The batch leaves the queue before any sink is called, so overlapping
    /// flushes never send the same record twice. On any sink failure the batch
    /// goes back to the front of the queue.
    pub(crate) async fn flush(&self) -> FlushOutcome {
        let batch: Vec<ErrorRecord> = {
            let Ok(mut queue) = self.inner.queue.lock() else {
                tracing::warn!("error queue lock poisoned, skipping flush");
                return FlushOutcome::Empty;
            };
            let take = self.inner.config.batch_size.min(queue.len());
            queue.drain(..take).collect()
        };

        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let sends = self.inner.sinks.iter().map(|sink| sink.send_batch(&batch));
        let results = futures::future::join_all(sends).await;

        let mut failed = false;
        for result in results {
            if let Err(e) = result {
                tracing::warn!(error = %e, "error sink failed");
                failed = true;
            }
        }

        if !failed {
            tracing::debug!(count = batch.len(), "flushed error batch");
            return FlushOutcome::Delivered(batch.len());
        }

        let count = batch.len();
        self.requeue(batch);
        FlushOutcome::Requeued(count)
    }

    fn requeue(&self, batch: Vec<ErrorRecord>) {
        let capacity = self.inner.config.queue_capacity;
        let Ok(mut queue) = self.inner.queue.lock() else {
            tracing::warn!("error queue lock poisoned, batch lost");
            return;
        };

        for record in batch.into_iter().rev() {
            queue.push_front(record);
        }
        while queue.len() > capacity {
            queue.pop_front();
        }
    }

    /// Number of records waiting for the next flush.
    pub fn queued_len(&self) -> usize {
        self.inner.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Records currently in the persisted log, oldest first.
    pub fn persisted_records(&self) -> Vec<ErrorRecord> {
        match store::get_json::<Vec<ErrorRecord>>(
            self.inner.local.as_ref(),
            &self.inner.config.storage_key,
        ) {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read persisted error log");
                Vec::new()
            }
        }
    }

    /// Totals by category and severity plus the most recent records, over
    /// the persisted log and the queue (each record counted once).
    pub fn get_error_stats(&self) -> ErrorStats {
        let queued: Vec<ErrorRecord> = self
            .inner
            .queue
            .lock()
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default();

        let mut seen = HashSet::new();
        let mut records: Vec<ErrorRecord> = self
            .persisted_records()
            .into_iter()
            .chain(queued)
            .filter(|r| seen.insert(r.error_id.clone()))
            .collect();
        records.sort_by_key(|r| r.timestamp);

        let mut stats = ErrorStats {
            total: records.len(),
            ..ErrorStats::default()
        };
        for record in &records {
            *stats.by_category.entry(record.category).or_default() += 1;
            *stats.by_severity.entry(record.severity).or_default() += 1;
        }
        stats.recent = records
            .iter()
            .rev()
            .take(self.inner.config.recent_limit)
            .cloned()
            .collect();
        stats
    }

    /// Empties the queue and the persisted log.
    pub fn clear_logs(&self) {
        if let Ok(mut queue) = self.inner.queue.lock() {
            queue.clear();
        }
        if let Err(e) = self.inner.local.remove(&self.inner.config.storage_key) {
            tracing::warn!(error = %e, "failed to clear persisted error log");
        }
    }
}

/// `<prefix>_<millis>_<9 hex chars>`.
fn generate_id(prefix: &str, millis: i64) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, millis, &random[..9])
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        fail: AtomicBool,
        batches: Mutex<Vec<usize>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ErrorSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send_batch(&self, batch: &[ErrorRecord]) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(SinkError::new("counting", batch.len(), "down"));
            }
            self.batches.lock().unwrap().push(batch.len());
            Ok(())
        }
    }

    fn logger_with(sink: Arc<CountingSink>, config: LoggerConfig) -> ErrorLogger {
        ErrorLogger::builder(config).sink(sink).build()
    }

    #[test]
    fn test_generate_id_format() {
        let id = generate_id("err", 1_700_000_000_000);
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "err");
        assert_eq!(parts[1], "1700000000000");
        assert_eq!(parts[2].len(), 9);
    }

    #[tokio::test]
    async fn test_flush_drains_one_batch() {
        let sink = Arc::new(CountingSink::default());
        let logger = logger_with(sink.clone(), LoggerConfig::default());

        for i in 0..25 {
            logger.log_error(ErrorDetails::new(format!("boom {}", i), "Footer")).await;
        }
        assert_eq!(logger.queued_len(), 25);

        assert_eq!(logger.flush().await, FlushOutcome::Delivered(10));
        assert_eq!(logger.queued_len(), 15);
        assert_eq!(logger.flush().await, FlushOutcome::Delivered(10));
        assert_eq!(logger.flush().await, FlushOutcome::Delivered(5));
        assert_eq!(logger.flush().await, FlushOutcome::Empty);
        assert_eq!(*sink.batches.lock().unwrap(), vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_failed_flush_requeues_at_front() {
        let sink = Arc::new(CountingSink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let logger = logger_with(sink.clone(), LoggerConfig::default());

        let first = logger.log_error(ErrorDetails::new("first", "Footer")).await;
        logger.log_error(ErrorDetails::new("second", "Footer")).await;

        assert_eq!(logger.flush().await, FlushOutcome::Requeued(2));
        assert_eq!(logger.queued_len(), 2);

        let front = logger.inner.queue.lock().unwrap().front().cloned().unwrap();
        assert_eq!(front.error_id, first.error_id);

        sink.fail.store(false, Ordering::SeqCst);
        assert_eq!(logger.flush().await, FlushOutcome::Delivered(2));
    }

    #[tokio::test]
    async fn test_critical_record_flushes_immediately() {
        let sink = Arc::new(CountingSink::default());
        let logger = logger_with(sink.clone(), LoggerConfig::default());

        logger.log_error(ErrorDetails::new("boom", "Footer")).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);

        let record = logger
            .log_error(ErrorDetails::new("Maximum update depth exceeded", "Application"))
            .await;
        assert_eq!(record.severity, Severity::Critical);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(logger.queued_len(), 0);
    }

    #[tokio::test]
    async fn test_user_id_from_auth_blob() {
        let local = Arc::new(MemoryStore::new());
        local
            .set(
                "supabase.auth.token",
                r#"{"currentSession":{"user":{"id":"user-42"}}}"#,
            )
            .unwrap();
        let logger = ErrorLogger::builder(LoggerConfig::default())
            .local_store(local)
            .build();

        let record = logger.log_error(ErrorDetails::new("boom", "Footer")).await;
        assert_eq!(record.user_id.as_deref(), Some("user-42"));
    }

    #[tokio::test]
    async fn test_session_id_is_stable() {
        let logger = ErrorLogger::builder(LoggerConfig::default()).build();
        let a = logger.log_error(ErrorDetails::new("a", "Footer")).await;
        let b = logger.log_error(ErrorDetails::new("b", "Footer")).await;

        assert!(a.session_id.as_deref().unwrap().starts_with("session_"));
        assert_eq!(a.session_id, b.session_id);
        assert_eq!(a.user_id.as_deref(), Some("anonymous"));
    }
}
