//! Coarse connection-quality estimate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TimeoutSettings;
use crate::platform::{ConnectionInfo, EffectiveType};

const POOR_DOWNLINK_MBPS: f64 = 0.5;
const GOOD_DOWNLINK_MBPS: f64 = 2.0;

/// Connection quality used to scale timeouts and retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Poor,
    #[default]
    Good,
    Excellent,
}

impl ConnectionQuality {
    /// Estimates quality from the host's network information.
    ///
    /// Without information the connection is assumed good.
    pub fn assess(info: Option<ConnectionInfo>) -> Self {
        let Some(info) = info else {
            return ConnectionQuality::Good;
        };

        if matches!(info.effective_type, EffectiveType::Slow2g | EffectiveType::TwoG) {
            return ConnectionQuality::Poor;
        }

        match (info.effective_type, info.downlink_mbps) {
            (_, Some(mbps)) if mbps < POOR_DOWNLINK_MBPS => ConnectionQuality::Poor,
            (EffectiveType::ThreeG, _) => ConnectionQuality::Good,
            (_, Some(mbps)) if mbps < GOOD_DOWNLINK_MBPS => ConnectionQuality::Good,
            (EffectiveType::Unknown, None) => ConnectionQuality::Good,
            _ => ConnectionQuality::Excellent,
        }
    }

    /// Per-attempt timeout for this quality.
    pub fn timeout(&self, settings: &TimeoutSettings) -> Duration {
        let millis = match self {
            ConnectionQuality::Poor => settings.poor_ms,
            ConnectionQuality::Good => settings.good_ms,
            ConnectionQuality::Excellent => settings.excellent_ms,
        };
        Duration::from_millis(millis)
    }

    /// Factor applied to retry delays.
    pub fn delay_multiplier(&self) -> f64 {
        match self {
            ConnectionQuality::Poor => 2.0,
            ConnectionQuality::Good => 1.0,
            ConnectionQuality::Excellent => 0.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionQuality::Poor => "poor",
            ConnectionQuality::Good => "good",
            ConnectionQuality::Excellent => "excellent",
        }
    }
}

impl std::fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(effective_type: EffectiveType, downlink: Option<f64>) -> Option<ConnectionInfo> {
        Some(ConnectionInfo::new(effective_type, downlink))
    }

    #[test]
    fn test_assess_without_information_is_good() {
        assert_eq!(ConnectionQuality::assess(None), ConnectionQuality::Good);
    }

    #[test]
    fn test_assess_slow_types_are_poor() {
        assert_eq!(
            ConnectionQuality::assess(info(EffectiveType::Slow2g, Some(10.0))),
            ConnectionQuality::Poor
        );
        assert_eq!(
            ConnectionQuality::assess(info(EffectiveType::TwoG, None)),
            ConnectionQuality::Poor
        );
    }

    #[test]
    fn test_assess_low_downlink_is_poor() {
        assert_eq!(
            ConnectionQuality::assess(info(EffectiveType::FourG, Some(0.3))),
            ConnectionQuality::Poor
        );
    }

    #[test]
    fn test_assess_moderate() {
        assert_eq!(
            ConnectionQuality::assess(info(EffectiveType::ThreeG, Some(5.0))),
            ConnectionQuality::Good
        );
        assert_eq!(
            ConnectionQuality::assess(info(EffectiveType::FourG, Some(1.5))),
            ConnectionQuality::Good
        );
    }

    #[test]
    fn test_assess_fast_is_excellent() {
        assert_eq!(
            ConnectionQuality::assess(info(EffectiveType::FourG, Some(10.0))),
            ConnectionQuality::Excellent
        );
        assert_eq!(
            ConnectionQuality::assess(info(EffectiveType::FourG, None)),
            ConnectionQuality::Excellent
        );
    }

    #[test]
    fn test_timeouts_and_multipliers() {
        let settings = TimeoutSettings::default();
        assert_eq!(ConnectionQuality::Poor.timeout(&settings), Duration::from_secs(30));
        assert_eq!(ConnectionQuality::Good.timeout(&settings), Duration::from_secs(15));
        assert_eq!(ConnectionQuality::Excellent.timeout(&settings), Duration::from_secs(10));
        assert_eq!(ConnectionQuality::Poor.delay_multiplier(), 2.0);
        assert_eq!(ConnectionQuality::Excellent.delay_multiplier(), 0.5);
    }
}
