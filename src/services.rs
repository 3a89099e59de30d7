//! Startup and teardown of the three resilience services.
//!
//! The services do not call each other. This bundle only constructs them over
//! one shared [`Platform`], attaches them to a single [`SignalHub`], and tears
//! them down together.

use crate::config::ResilienceConfig;
use crate::events::{ResetBus, SignalHub};
use crate::logger::ErrorLogger;
use crate::network::{NetworkOrchestrator, TransportError};
use crate::platform::Platform;
use crate::recovery::RecoveryManager;

/// The error logger, network orchestrator and recovery manager, built once at
/// startup.
#[derive(Debug, Clone)]
pub struct ResilienceServices {
    pub logger: ErrorLogger,
    pub network: NetworkOrchestrator,
    pub recovery: RecoveryManager,
    signals: SignalHub,
}

impl ResilienceServices {
    /// Builds all three services over `platform`.
    ///
    /// Fails only if the default HTTP client cannot be constructed.
    pub fn new(config: ResilienceConfig, platform: Platform) -> Result<Self, TransportError> {
        let logger = ErrorLogger::builder(config.logger)
            .local_store(platform.local.clone())
            .session_store(platform.session.clone())
            .build();

        let network = NetworkOrchestrator::builder(config.network)
            .probe(platform.probe.clone())
            .local_store(platform.local.clone())
            .build()?;

        let recovery = RecoveryManager::new(config.recovery, platform, ResetBus::new());

        Ok(Self::from_parts(logger, network, recovery))
    }

    /// Bundles services that were built separately.
    pub fn from_parts(
        logger: ErrorLogger,
        network: NetworkOrchestrator,
        recovery: RecoveryManager,
    ) -> Self {
        Self {
            logger,
            network,
            recovery,
            signals: SignalHub::new(),
        }
    }

    /// Hub the host raises online/offline/unload signals on.
    pub fn signals(&self) -> &SignalHub {
        &self.signals
    }

    /// Bus the UI subscribes to for state-reset notifications.
    pub fn resets(&self) -> &ResetBus {
        self.recovery.resets()
    }

    /// Starts the flush and connection-quality timers and the signal listeners.
    pub fn start(&self) {
        self.logger.start(Some(&self.signals));
        self.network.start(Some(&self.signals));
        tracing::info!("resilience services started");
    }

    /// Stops background work and flushes the error queue.
    pub async fn shutdown(&self) {
        self.network.shutdown().await;
        self.logger.shutdown().await;
        tracing::info!("resilience services stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorDetails;
    use crate::events::PlatformSignal;
    use crate::store::KeyValueStore;

    #[tokio::test]
    async fn test_services_share_platform_storage() {
        let platform = Platform::headless();
        let services = ResilienceServices::new(ResilienceConfig::default(), platform.clone()).unwrap();

        services
            .logger
            .log_error(ErrorDetails::new("JSON parse failed", "LessonLoader"))
            .await;
        assert!(platform.local.get("error_logs").unwrap().is_some());

        services.recovery.clear_all_caches().await.unwrap();
        assert!(platform.local.get("error_logs").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let services = ResilienceServices::new(ResilienceConfig::default(), Platform::headless()).unwrap();
        services.start();
        assert!(services.logger.is_running());
        assert!(services.network.is_running());

        services.signals().emit(PlatformSignal::Offline);
        services.shutdown().await;
        assert!(!services.logger.is_running());
        assert!(!services.network.is_running());
    }
}
