//! Diagnostic logging setup.
//!
//! The services report through `tracing`; this module installs a
//! `tracing-subscriber` formatter for hosts that do not bring their own.
//! Output goes to stderr, and `RUST_LOG` wins over the configured level when
//! it is set.

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::{fmt as subscriber_fmt, EnvFilter};

/// Log level for the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Disable logging entirely
    Off,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    /// Level for a `-v`/`-q` count: quiet wins, then 0 = info, 1 = debug, 2+ = trace.
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return LogLevel::Warn;
        }
        match verbose {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "none" => Ok(LogLevel::Off),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub with_timestamps: bool,
    pub with_target: bool,
    /// Restrict output to this crate's events instead of every crate's.
    pub crate_only: bool,
    pub with_ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamps: true,
            with_target: true,
            crate_only: false,
            with_ansi: true,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.with_timestamps = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn crate_only(mut self, enabled: bool) -> Self {
        self.crate_only = enabled;
        self
    }

    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }

    /// Configuration for CLI verbosity flags.
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        Self::default().with_level(LogLevel::from_flags(verbose, quiet))
    }

    /// The filter directive used when `RUST_LOG` is unset.
    pub fn directive(&self) -> String {
        if self.crate_only && self.level != LogLevel::Off {
            format!("{}={}", env!("CARGO_CRATE_NAME"), self.level)
        } else {
            self.level.to_string()
        }
    }
}

/// Installs a global stderr subscriber.
///
/// Returns `false` if a global subscriber was already installed, which makes
/// repeated calls harmless.
///
/// # Examples
///
/// ```no_run
/// use lyra_resilience::logging::{init_logging, LogLevel, LoggingConfig};
///
/// init_logging(LoggingConfig::new().with_level(LogLevel::Debug).crate_only(true));
/// ```
pub fn init_logging(config: LoggingConfig) -> bool {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(config.directive()),
    };

    let builder = subscriber_fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(config.with_target)
        .with_ansi(config.with_ansi);

    let installed = if config.with_timestamps {
        builder.try_init().is_ok()
    } else {
        builder.without_time().try_init().is_ok()
    };

    if installed {
        tracing::debug!(level = %config.level, "logging initialised");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_flags() {
        assert_eq!(LogLevel::from_flags(0, false), LogLevel::Info);
        assert_eq!(LogLevel::from_flags(1, false), LogLevel::Debug);
        assert_eq!(LogLevel::from_flags(7, false), LogLevel::Trace);
        assert_eq!(LogLevel::from_flags(2, true), LogLevel::Warn);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("off".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_directive() {
        let config = LoggingConfig::new().with_level(LogLevel::Debug);
        assert_eq!(config.directive(), "debug");

        let config = config.crate_only(true);
        assert_eq!(config.directive(), "lyra_resilience=debug");

        let config = LoggingConfig::new().with_level(LogLevel::Off).crate_only(true);
        assert_eq!(config.directive(), "off");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig::new().with_level(LogLevel::Off);
        let first = init_logging(config.clone());
        let second = init_logging(config);
        assert!(!second || !first);
    }
}
