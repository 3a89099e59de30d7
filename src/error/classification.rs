//! Error record types.
//!
//! [`ErrorDetails`] is what a caller knows about a failure at capture time.
//! [`ErrorRecord`] is the immutable, classified and enriched form that the
//! logger queues and persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broad area a failure belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Requests, fetches and connectivity.
    Network,
    /// Component rendering.
    Render,
    /// Application or component state management.
    State,
    /// Interactive lesson patterns.
    Interaction,
    /// Parsing and data shape problems.
    Data,
    /// Nothing matched.
    Unknown,
}

impl ErrorCategory {
    /// All categories, in declaration order.
    pub const ALL: [ErrorCategory; 6] = [
        ErrorCategory::Network,
        ErrorCategory::Render,
        ErrorCategory::State,
        ErrorCategory::Interaction,
        ErrorCategory::Data,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Render => "render",
            ErrorCategory::State => "state",
            ErrorCategory::Interaction => "interaction",
            ErrorCategory::Data => "data",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown error category: {}", s))
    }
}

/// How serious a failure is. Ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected effect of a failure on the learner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserImpact {
    Minimal,
    Moderate,
    Severe,
}

impl UserImpact {
    /// Impact lookup over severity and category.
    ///
    /// Critical and high severities are always severe; otherwise network and
    /// render failures are moderate and everything else is minimal.
    pub fn from_parts(severity: Severity, category: ErrorCategory) -> Self {
        match (severity, category) {
            (Severity::Critical | Severity::High, _) => UserImpact::Severe,
            (_, ErrorCategory::Network | ErrorCategory::Render) => UserImpact::Moderate,
            _ => UserImpact::Minimal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserImpact::Minimal => "minimal",
            UserImpact::Moderate => "moderate",
            UserImpact::Severe => "severe",
        }
    }
}

impl std::fmt::Display for UserImpact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The derived fields of a classified failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub user_impact: UserImpact,
    /// False only for known-fatal signatures; the UI should offer a reload
    /// instead of automatic recovery.
    pub recoverable: bool,
}

/// Raw description of a failure, as handed to the logger.
///
/// Only `message` and `context` are required. Client metadata left empty is
/// filled in by the logger.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorDetails {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_stack: Option<String>,
    /// Label of the boundary or feature that caught the failure.
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: context.into(),
            ..Self::default()
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_component_stack(mut self, stack: impl Into<String>) -> Self {
        self.component_stack = Some(stack.into());
        self
    }

    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    pub fn with_pattern_type(mut self, pattern_type: impl Into<String>) -> Self {
        self.pattern_type = Some(pattern_type.into());
        self
    }

    pub fn with_component_type(mut self, component_type: impl Into<String>) -> Self {
        self.component_type = Some(component_type.into());
        self
    }

    pub fn with_chapter(mut self, chapter_number: u32) -> Self {
        self.chapter_number = Some(chapter_number);
        self
    }

    pub fn with_character(mut self, character_name: impl Into<String>) -> Self {
        self.character_name = Some(character_name.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// A captured, classified failure. Never mutated after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub error_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_stack: Option<String>,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_name: Option<String>,
    pub user_agent: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub user_impact: UserImpact,
    pub recoverable: bool,
}

impl ErrorRecord {
    /// Combines fully enriched details with their classification.
    ///
    /// Metadata still missing from `details` falls back to neutral values
    /// (`"unknown"` agent and url, the current time, an empty id).
    pub fn new(details: ErrorDetails, classification: Classification) -> Self {
        Self {
            error_id: details.error_id.unwrap_or_default(),
            message: details.message,
            stack: details.stack,
            component_stack: details.component_stack,
            context: details.context,
            error_type: details.error_type,
            pattern_type: details.pattern_type,
            component_type: details.component_type,
            chapter_number: details.chapter_number,
            character_name: details.character_name,
            user_agent: details.user_agent.unwrap_or_else(|| "unknown".to_string()),
            url: details.url.unwrap_or_else(|| "unknown".to_string()),
            timestamp: details.timestamp.unwrap_or_else(Utc::now),
            user_id: details.user_id,
            session_id: details.session_id,
            category: classification.category,
            severity: classification.severity,
            user_impact: classification.user_impact,
            recoverable: classification.recoverable,
        }
    }

    /// The classification part of the record.
    pub fn classification(&self) -> Classification {
        Classification {
            category: self.category,
            severity: self.severity,
            user_impact: self.user_impact,
            recoverable: self.recoverable,
        }
    }
}
