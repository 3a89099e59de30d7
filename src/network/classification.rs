//! Classification of failed network attempts.
//!
//! Like the error classifier, this is an ordered rule table: the first rule
//! matching the failed attempt decides its [`NetworkErrorKind`].

use std::ops::RangeInclusive;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::TransportError;

/// Sub-classification of a network failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkErrorKind {
    Timeout,
    Offline,
    Server,
    Dns,
    Cors,
    Unknown,
}

impl NetworkErrorKind {
    /// Cross-origin failures are never retried; everything else may be.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, NetworkErrorKind::Cors)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkErrorKind::Timeout => "timeout",
            NetworkErrorKind::Offline => "offline",
            NetworkErrorKind::Server => "server",
            NetworkErrorKind::Dns => "dns",
            NetworkErrorKind::Cors => "cors",
            NetworkErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about one failed attempt.
#[derive(Debug, Clone, Copy)]
pub struct FailedAttempt<'a> {
    /// Online flag at the time of failure.
    pub online: bool,
    /// Status of a response that matched the retry condition.
    pub status: Option<u16>,
    /// Transport failure, when no response arrived.
    pub transport: Option<&'a TransportError>,
}

impl FailedAttempt<'_> {
    /// Human-readable description used as the error message.
    pub fn message(&self) -> String {
        match (self.transport, self.status) {
            (Some(err), _) => err.message.clone(),
            (None, Some(status)) => format!("HTTP {}", status),
            (None, None) if !self.online => "network offline".to_string(),
            (None, None) => "request failed".to_string(),
        }
    }
}

/// Predicate over a failed attempt.
#[derive(Debug)]
pub enum FailureMatcher {
    /// The host reported itself offline.
    Offline,
    /// The response status falls in the range.
    Status(RangeInclusive<u16>),
    /// The per-attempt timeout fired.
    TimedOut,
    /// The transport message matches.
    Message(Regex),
}

impl FailureMatcher {
    /// # Panics
    /// Panics if the regex pattern is invalid.
    pub fn message(pattern: &str) -> Self {
        FailureMatcher::Message(Regex::new(pattern).expect("Invalid regex pattern"))
    }

    pub fn matches(&self, attempt: &FailedAttempt<'_>) -> bool {
        match self {
            FailureMatcher::Offline => !attempt.online,
            FailureMatcher::Status(range) => attempt.status.is_some_and(|s| range.contains(&s)),
            FailureMatcher::TimedOut => attempt.transport.is_some_and(|t| t.timed_out),
            FailureMatcher::Message(regex) => attempt
                .transport
                .is_some_and(|t| regex.is_match(&t.message)),
        }
    }
}

/// One row of the network classification table.
#[derive(Debug)]
pub struct FailureRule {
    matcher: FailureMatcher,
    kind: NetworkErrorKind,
}

impl FailureRule {
    pub fn new(matcher: FailureMatcher, kind: NetworkErrorKind) -> Self {
        Self { matcher, kind }
    }

    pub fn kind(&self) -> NetworkErrorKind {
        self.kind
    }
}

/// Maps failed attempts to a [`NetworkErrorKind`].
#[derive(Debug)]
pub struct NetworkErrorClassifier {
    rules: Vec<FailureRule>,
}

impl Default for NetworkErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkErrorClassifier {
    pub fn new() -> Self {
        Self {
            rules: Self::default_rules(),
        }
    }

    pub fn with_rules(rules: Vec<FailureRule>) -> Self {
        Self { rules }
    }

    fn default_rules() -> Vec<FailureRule> {
        use FailureMatcher as M;
        use NetworkErrorKind as K;

        vec![
            FailureRule::new(M::Offline, K::Offline),
            FailureRule::new(M::Status(408..=408), K::Timeout),
            FailureRule::new(M::Status(429..=429), K::Server),
            FailureRule::new(M::Status(500..=599), K::Server),
            FailureRule::new(M::TimedOut, K::Timeout),
            FailureRule::new(M::message(r"(?i)cors|cross-origin"), K::Cors),
            FailureRule::new(
                M::message(r"(?i)dns|resolve|lookup|name not known|name or service"),
                K::Dns,
            ),
            FailureRule::new(M::message(r"(?i)time(d)?\s*out|abort"), K::Timeout),
            FailureRule::new(
                M::message(r"(?i)offline|unreachable|network is down|internet disconnected"),
                K::Offline,
            ),
            FailureRule::new(M::message(r"(?i)server|\b5\d\d\b"), K::Server),
        ]
    }

    pub fn rules(&self) -> &[FailureRule] {
        &self.rules
    }

    pub fn classify(&self, attempt: &FailedAttempt<'_>) -> NetworkErrorKind {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(attempt))
            .map(|rule| rule.kind)
            .unwrap_or(NetworkErrorKind::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn transport(message: &str) -> TransportError {
        TransportError::new(message)
    }

    fn classify(online: bool, status: Option<u16>, err: Option<&TransportError>) -> NetworkErrorKind {
        NetworkErrorClassifier::new().classify(&FailedAttempt {
            online,
            status,
            transport: err,
        })
    }

    #[test]
    fn test_offline_flag_wins() {
        let err = transport("CORS policy blocked");
        assert_eq!(classify(false, None, Some(&err)), NetworkErrorKind::Offline);
        assert_eq!(classify(false, Some(503), None), NetworkErrorKind::Offline);
    }

    #[test]
    fn test_status_rules() {
        assert_eq!(classify(true, Some(408), None), NetworkErrorKind::Timeout);
        assert_eq!(classify(true, Some(429), None), NetworkErrorKind::Server);
        assert_eq!(classify(true, Some(503), None), NetworkErrorKind::Server);
        assert_eq!(classify(true, Some(418), None), NetworkErrorKind::Unknown);
    }

    #[test]
    fn test_transport_rules() {
        let timeout = TransportError::timeout(Duration::from_secs(15));
        assert_eq!(classify(true, None, Some(&timeout)), NetworkErrorKind::Timeout);

        let cors = transport("blocked by CORS policy");
        assert_eq!(classify(true, None, Some(&cors)), NetworkErrorKind::Cors);
        assert!(!NetworkErrorKind::Cors.is_retryable());

        let dns = transport("dns error: failed to lookup address information");
        assert_eq!(classify(true, None, Some(&dns)), NetworkErrorKind::Dns);

        let aborted = transport("The user aborted a request.");
        assert_eq!(classify(true, None, Some(&aborted)), NetworkErrorKind::Timeout);

        let unreachable = transport("Network is unreachable");
        assert_eq!(classify(true, None, Some(&unreachable)), NetworkErrorKind::Offline);

        let other = transport("connection reset by peer");
        assert_eq!(classify(true, None, Some(&other)), NetworkErrorKind::Unknown);
    }

    #[test]
    fn test_failed_attempt_message() {
        let attempt = FailedAttempt {
            online: true,
            status: Some(503),
            transport: None,
        };
        assert_eq!(attempt.message(), "HTTP 503");
    }
}
