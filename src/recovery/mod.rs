//! Recovery strategy manager.
//!
//! A catalog of named remediation actions (connectivity probes, cache clears,
//! scoped state resets and a full wipe) executed on demand. Every execution is
//! timed, recorded in a bounded history and folded into a per-strategy success
//! rate computed over the most recent outcomes.

pub mod catalog;
pub mod manager;
pub mod stats;
pub mod strategy;

pub use catalog::{character_component_reset, default_strategies, ids, pattern_reset};
pub use manager::RecoveryManager;
pub use stats::{RecoveryStats, StrategyStats, SuccessRecord};
pub use strategy::{
    RecoveryAction, RecoveryContext, RecoveryResult, RecoveryStrategy, StrategySummary,
};

use thiserror::Error;

use crate::platform::PlatformError;
use crate::store::StoreError;

/// Errors raised inside recovery strategies.
///
/// These never escape [`RecoveryManager::execute_recovery_strategy`]; they are
/// rendered into [`RecoveryResult::error`].
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// A platform capability was missing or failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Reading or clearing storage failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The strategy reported a failure of its own.
    #[error("{0}")]
    Failed(String),

    /// The strategy panicked.
    #[error("strategy panicked: {0}")]
    Panicked(String),

    /// No strategy with this id is registered.
    #[error("unknown recovery strategy: {0}")]
    UnknownStrategy(String),
}
