//! Reset notifications and platform signals.
//!
//! Two broadcast channels decouple the services from the UI layer:
//!
//! - [`ResetBus`] carries the reset signals emitted by recovery strategies so
//!   subscribed views can re-render.
//! - [`SignalHub`] carries host signals (online/offline transitions, network
//!   information changes, page unload) into the services.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::platform::ConnectionInfo;

const CHANNEL_CAPACITY: usize = 64;

/// A reset performed by a recovery strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ResetEvent {
    /// The whole application state was reset.
    Application,
    /// State belonging to one interaction pattern was reset.
    Pattern { pattern_type: String },
    /// State belonging to one character's component was reset.
    CharacterComponent { character: String, component: String },
}

/// Publish/subscribe channel for [`ResetEvent`]s.
#[derive(Debug, Clone)]
pub struct ResetBus {
    sender: broadcast::Sender<ResetEvent>,
}

impl Default for ResetBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ResetBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribes to future reset events.
    pub fn subscribe(&self) -> broadcast::Receiver<ResetEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event, returning how many subscribers received it.
    ///
    /// Publishing with no subscribers is not an error.
    pub fn emit(&self, event: ResetEvent) -> usize {
        tracing::debug!(?event, "reset event");
        self.sender.send(event).unwrap_or(0)
    }
}

/// Signals raised by the host environment.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformSignal {
    /// The host regained connectivity.
    Online,
    /// The host lost connectivity.
    Offline,
    /// The network information changed.
    ConnectionChange(ConnectionInfo),
    /// The page is about to unload.
    Unload,
}

/// Fan-out of host signals to every attached service.
#[derive(Debug, Clone)]
pub struct SignalHub {
    sender: broadcast::Sender<PlatformSignal>,
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformSignal> {
        self.sender.subscribe()
    }

    /// Raises a signal; returns the number of listeners that will see it.
    pub fn emit(&self, signal: PlatformSignal) -> usize {
        self.sender.send(signal).unwrap_or(0)
    }
}
