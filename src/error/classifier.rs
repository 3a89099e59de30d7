//! Rule-table error classifier.
//!
//! Category and severity are each decided by an ordered list of rules. Rules
//! are evaluated top to bottom and the first match wins, so every rule can be
//! tested on its own and the tables can be replaced wholesale.

use regex::Regex;

use super::{Classification, ErrorCategory, ErrorDetails, Severity, UserImpact};

/// A field of [`ErrorDetails`] a rule can inspect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Message,
    Stack,
    ComponentStack,
    Context,
    ErrorType,
    PatternType,
    ComponentType,
    ChapterNumber,
    CharacterName,
}

impl Field {
    fn text<'a>(&self, details: &'a ErrorDetails) -> Option<&'a str> {
        match self {
            Field::Message => Some(details.message.as_str()),
            Field::Context => Some(details.context.as_str()),
            Field::Stack => details.stack.as_deref(),
            Field::ComponentStack => details.component_stack.as_deref(),
            Field::ErrorType => details.error_type.as_deref(),
            Field::PatternType => details.pattern_type.as_deref(),
            Field::ComponentType => details.component_type.as_deref(),
            Field::CharacterName => details.character_name.as_deref(),
            Field::ChapterNumber => None,
        }
    }

    fn is_present(&self, details: &ErrorDetails) -> bool {
        match self {
            Field::ChapterNumber => details.chapter_number.is_some(),
            other => other.text(details).is_some_and(|s| !s.trim().is_empty()),
        }
    }
}

/// Predicate over a failure and (for severity rules) its category.
#[derive(Debug)]
pub enum Matcher {
    /// Regex search over any of the listed fields.
    Text { fields: Vec<Field>, regex: Regex },
    /// The field is set and non-blank.
    Present(Field),
    /// The context label starts with the given prefix.
    ContextPrefix(String),
    /// The already-derived category equals this one.
    Category(ErrorCategory),
    /// Every inner matcher matches.
    All(Vec<Matcher>),
    /// At least one inner matcher matches.
    Any(Vec<Matcher>),
}

impl Matcher {
    /// Regex matcher over `fields`.
    ///
    /// # Panics
    /// Panics if the regex pattern is invalid.
    pub fn text(fields: &[Field], pattern: &str) -> Self {
        Matcher::Text {
            fields: fields.to_vec(),
            regex: Regex::new(pattern).expect("Invalid regex pattern"),
        }
    }

    pub fn matches(&self, details: &ErrorDetails, category: ErrorCategory) -> bool {
        match self {
            Matcher::Text { fields, regex } => fields
                .iter()
                .filter_map(|field| field.text(details))
                .any(|text| regex.is_match(text)),
            Matcher::Present(field) => field.is_present(details),
            Matcher::ContextPrefix(prefix) => details.context.starts_with(prefix.as_str()),
            Matcher::Category(expected) => *expected == category,
            Matcher::All(inner) => inner.iter().all(|m| m.matches(details, category)),
            Matcher::Any(inner) => inner.iter().any(|m| m.matches(details, category)),
        }
    }
}

/// Maps a matching failure to a category.
#[derive(Debug)]
pub struct CategoryRule {
    matcher: Matcher,
    category: ErrorCategory,
    description: String,
}

impl CategoryRule {
    pub fn new(matcher: Matcher, category: ErrorCategory, description: impl Into<String>) -> Self {
        Self {
            matcher,
            category,
            description: description.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Category rules never depend on a category, so `Unknown` is passed through.
    pub fn matches(&self, details: &ErrorDetails) -> bool {
        self.matcher.matches(details, ErrorCategory::Unknown)
    }
}

/// Maps a matching failure to a severity, optionally marking it fatal.
#[derive(Debug)]
pub struct SeverityRule {
    matcher: Matcher,
    severity: Severity,
    fatal: bool,
    description: String,
}

impl SeverityRule {
    pub fn new(matcher: Matcher, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            matcher,
            severity,
            fatal: false,
            description: description.into(),
        }
    }

    /// A known-fatal signature: the record will be marked unrecoverable.
    pub fn fatal(matcher: Matcher, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            fatal: true,
            ..Self::new(matcher, severity, description)
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn matches(&self, details: &ErrorDetails, category: ErrorCategory) -> bool {
        self.matcher.matches(details, category)
    }
}

/// Turns [`ErrorDetails`] into a [`Classification`].
#[derive(Debug)]
pub struct ErrorClassifier {
    category_rules: Vec<CategoryRule>,
    severity_rules: Vec<SeverityRule>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    /// Creates a classifier with the default rule tables.
    pub fn new() -> Self {
        Self {
            category_rules: Self::default_category_rules(),
            severity_rules: Self::default_severity_rules(),
        }
    }

    /// Creates a classifier with custom rule tables.
    pub fn with_rules(category_rules: Vec<CategoryRule>, severity_rules: Vec<SeverityRule>) -> Self {
        Self {
            category_rules,
            severity_rules,
        }
    }

    fn default_category_rules() -> Vec<CategoryRule> {
        use Field::*;

        vec![
            CategoryRule::new(
                Matcher::text(&[Message, Stack, Context], r"(?i)network|fetch|xhr"),
                ErrorCategory::Network,
                "Network or fetch failure",
            ),
            CategoryRule::new(
                Matcher::Any(vec![
                    Matcher::Present(PatternType),
                    Matcher::text(&[Context], r"(?i)interaction|pattern"),
                ]),
                ErrorCategory::Interaction,
                "Interactive pattern failure",
            ),
            // Context is left out: provider labels such as `LessonContext`
            // would otherwise classify every failure inside them as state.
            CategoryRule::new(
                Matcher::text(&[Message, Stack], r"(?i)state|reducer|context"),
                ErrorCategory::State,
                "State management failure",
            ),
            CategoryRule::new(
                Matcher::text(&[Message, Stack], r"(?i)data|parse|json"),
                ErrorCategory::Data,
                "Data or parsing failure",
            ),
            CategoryRule::new(
                Matcher::Any(vec![
                    Matcher::text(&[Stack, ComponentStack], r"(?i)render"),
                    Matcher::Present(ComponentType),
                    Matcher::text(&[Context], r"(?i)component"),
                ]),
                ErrorCategory::Render,
                "Rendering failure",
            ),
        ]
    }

    fn default_severity_rules() -> Vec<SeverityRule> {
        use Field::*;

        vec![
            // Known-fatal signatures
            SeverityRule::fatal(
                Matcher::text(&[Message], r"(?i)maximum update depth"),
                Severity::Critical,
                "Render loop",
            ),
            SeverityRule::fatal(
                Matcher::text(&[Message], r"(?i)invariant violation"),
                Severity::Critical,
                "Framework invariant violated",
            ),
            SeverityRule::fatal(
                Matcher::All(vec![
                    Matcher::Category(ErrorCategory::Render),
                    Matcher::text(&[Message], r"(?i)\bhooks?\b"),
                ]),
                Severity::Critical,
                "Hook misuse during render",
            ),
            SeverityRule::new(
                Matcher::All(vec![
                    Matcher::Category(ErrorCategory::Network),
                    Matcher::text(&[Message], r"(?i)time(d)?\s*out"),
                ]),
                Severity::High,
                "Network timeout",
            ),
            SeverityRule::new(
                Matcher::text(
                    &[Message],
                    r"(?i)cannot read propert(y|ies) of undefined|undefined is not an object|state is undefined",
                ),
                Severity::High,
                "Undefined state access",
            ),
            SeverityRule::new(
                Matcher::ContextPrefix("Application".to_string()),
                Severity::High,
                "Application-level boundary",
            ),
            SeverityRule::new(
                Matcher::Any(vec![
                    Matcher::Present(PatternType),
                    Matcher::text(&[Context], r"(?i)pattern|interaction"),
                ]),
                Severity::Medium,
                "Interactive pattern",
            ),
            SeverityRule::new(
                Matcher::Any(vec![
                    Matcher::Present(CharacterName),
                    Matcher::Present(ComponentType),
                    Matcher::text(&[Context], r"(?i)carmen|character|chapter|lesson"),
                ]),
                Severity::Medium,
                "Named lesson feature",
            ),
        ]
    }

    /// Adds a category rule after the existing ones.
    pub fn add_category_rule(&mut self, rule: CategoryRule) {
        self.category_rules.push(rule);
    }

    /// Adds a severity rule after the existing ones.
    pub fn add_severity_rule(&mut self, rule: SeverityRule) {
        self.severity_rules.push(rule);
    }

    pub fn category_rules(&self) -> &[CategoryRule] {
        &self.category_rules
    }

    pub fn severity_rules(&self) -> &[SeverityRule] {
        &self.severity_rules
    }

    /// First matching category rule, else `Unknown`.
    pub fn category(&self, details: &ErrorDetails) -> ErrorCategory {
        self.category_rules
            .iter()
            .find(|rule| rule.matches(details))
            .map(|rule| rule.category)
            .unwrap_or(ErrorCategory::Unknown)
    }

    /// First matching severity rule as `(severity, fatal)`, else `(Low, false)`.
    pub fn severity(&self, details: &ErrorDetails, category: ErrorCategory) -> (Severity, bool) {
        self.severity_rules
            .iter()
            .find(|rule| rule.matches(details, category))
            .map(|rule| (rule.severity, rule.fatal))
            .unwrap_or((Severity::Low, false))
    }

    /// Full classification of a failure. Never fails.
    pub fn classify(&self, details: &ErrorDetails) -> Classification {
        let category = self.category(details);
        let (severity, fatal) = self.severity(details, category);

        Classification {
            category,
            severity,
            user_impact: UserImpact::from_parts(severity, category),
            recoverable: !fatal,
        }
    }
}
