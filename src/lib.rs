//! Lyra Resilience - client-side failure handling for the learning app
//!
//! Three independent services:
//!
//! - [`logger::ErrorLogger`] classifies, enriches, queues, persists and
//!   batches runtime errors.
//! - [`network::NetworkOrchestrator`] wraps HTTP calls with adaptive retry,
//!   offline queueing and replay on reconnect.
//! - [`recovery::RecoveryManager`] runs named recovery strategies and learns
//!   how often each one works.
//!
//! [`services::ResilienceServices`] builds all three over one
//! [`platform::Platform`] and owns their startup and teardown.

pub mod config;
pub mod error;
pub mod events;
pub mod logger;
pub mod logging;
pub mod network;
pub mod platform;
pub mod recovery;
pub mod services;
pub mod store;

mod tasks;

pub use config::ResilienceConfig;
pub use services::ResilienceServices;
