//! Development console output for captured errors.
//!
//! Each record is printed as a short severity-colored block on stderr.

use owo_colors::{OwoColorize, Rgb};

use crate::error::{ErrorRecord, Severity};

/// 24-bit colors used for each severity.
#[derive(Debug, Clone, Copy)]
pub struct SeverityTheme {
    /// Critical - red (239, 68, 68)
    pub critical: Rgb,
    /// High - orange (249, 115, 22)
    pub high: Rgb,
    /// Medium - yellow (234, 179, 8)
    pub medium: Rgb,
    /// Low - blue (59, 130, 246)
    pub low: Rgb,
    /// Secondary text - gray (107, 114, 128)
    pub muted: Rgb,
}

impl Default for SeverityTheme {
    fn default() -> Self {
        Self {
            critical: Rgb(239, 68, 68),
            high: Rgb(249, 115, 22),
            medium: Rgb(234, 179, 8),
            low: Rgb(59, 130, 246),
            muted: Rgb(107, 114, 128),
        }
    }
}

impl SeverityTheme {
    pub fn for_severity(&self, severity: Severity) -> Rgb {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

/// Renders [`ErrorRecord`]s for a developer watching the terminal.
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    theme: SeverityTheme,
    use_color: bool,
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            theme: SeverityTheme::default(),
            use_color: true,
        }
    }

    /// Set whether to emit ANSI colors.
    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    pub fn with_theme(mut self, theme: SeverityTheme) -> Self {
        self.theme = theme;
        self
    }

    /// Renders one record as a multi-line summary.
    pub fn render(&self, record: &ErrorRecord) -> String {
        let header = format!(
            "[{}] {} error in {}",
            record.severity.as_str().to_uppercase(),
            record.category,
            record.context
        );
        let header = if self.use_color {
            header
                .color(self.theme.for_severity(record.severity))
                .bold()
                .to_string()
        } else {
            header
        };

        let meta = format!(
            "id={} impact={} recoverable={}",
            record.error_id, record.user_impact, record.recoverable
        );
        let meta = if self.use_color {
            meta.color(self.theme.muted).to_string()
        } else {
            meta
        };

        let mut out = format!("{}\n  {}\n  {}", header, record.message, meta);
        if let Some(stack) = &record.stack {
            for line in stack.lines().take(5) {
                out.push_str("\n    ");
                out.push_str(line.trim());
            }
        }
        out
    }

    /// Prints a record to stderr.
    pub fn report(&self, record: &ErrorRecord) {
        eprintln!("{}", self.render(record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorClassifier, ErrorDetails};

    fn record(message: &str, context: &str) -> ErrorRecord {
        let details = ErrorDetails::new(message, context).with_stack("at a\nat b\nat c");
        let classification = ErrorClassifier::new().classify(&details);
        ErrorRecord::new(details, classification)
    }

    #[test]
    fn test_render_plain() {
        let reporter = ConsoleReporter::new().with_color(false);
        let out = reporter.render(&record("Maximum update depth exceeded", "Application"));

        assert!(out.starts_with("[CRITICAL] unknown error in Application"));
        assert!(out.contains("Maximum update depth exceeded"));
        assert!(out.contains("recoverable=false"));
        assert!(out.contains("    at b"));
    }

    #[test]
    fn test_render_colored_contains_ansi() {
        let reporter = ConsoleReporter::new();
        let out = reporter.render(&record("boom", "Footer"));
        assert!(out.contains("\u{1b}["));
        assert!(out.contains("boom"));
    }

    #[test]
    fn test_theme_per_severity() {
        let theme = SeverityTheme::default();
        let Rgb(r, g, b) = theme.for_severity(Severity::Critical);
        assert_eq!((r, g, b), (239, 68, 68));
        let Rgb(r, g, b) = theme.for_severity(Severity::Low);
        assert_eq!((r, g, b), (59, 130, 246));
    }
}
