//! Logging setup shared by every SocialDeck binary
//!
//! Output goes to stderr so that stdout stays clean for command results.
//! The format and level can be chosen by flag or by environment:
//!
//! ```bash
//! export SOCIALDECK_LOG_FORMAT=json
//! export SOCIALDECK_LOG_LEVEL=debug
//! deck-send --once
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain lines without colors, suitable for piping
    Text,
    /// One JSON object per line
    Json,
    /// Multi-line colored output for development
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Build from `SOCIALDECK_LOG_FORMAT` / `SOCIALDECK_LOG_LEVEL`, defaulting to text at info
    pub fn from_env(verbose: bool) -> Self {
        let format = std::env::var("SOCIALDECK_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);
        let level = std::env::var("SOCIALDECK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        Self::new(format, level, verbose)
    }

    /// Like `from_env`, but one-shot tools only report warnings unless asked
    pub fn for_cli(verbose: bool) -> Self {
        let mut config = Self::from_env(verbose);
        if std::env::var("SOCIALDECK_LOG_LEVEL").is_err() {
            config.level = "warn".to_string();
        }
        config
    }

    /// The filter directive in effect; `RUST_LOG` still wins when set
    fn filter(&self) -> EnvFilter {
        let fallback = if self.verbose { "debug" } else { self.level.as_str() };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    }

    /// Install the global subscriber
    ///
    /// Calling this twice is harmless: the second attempt is ignored.
    pub fn init(&self) {
        let filter = self.filter();

        let result = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .flatten_event(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(false)
                .try_init(),
        };

        if let Err(e) = result {
            tracing::debug!("logging already initialized: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);

        let err = "xml".parse::<LogFormat>().unwrap_err();
        assert!(err.contains("Invalid log format: 'xml'"));
    }

    #[test]
    fn test_log_format_display() {
        assert_eq!(LogFormat::Json.to_string(), "json");
        assert_eq!(LogFormat::Text.to_string(), "text");
    }

    #[test]
    #[serial]
    fn test_from_env_reads_socialdeck_vars() {
        std::env::set_var("SOCIALDECK_LOG_FORMAT", "json");
        std::env::set_var("SOCIALDECK_LOG_LEVEL", "warn");
        let config = LoggingConfig::from_env(false);
        std::env::remove_var("SOCIALDECK_LOG_FORMAT");
        std::env::remove_var("SOCIALDECK_LOG_LEVEL");

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "warn");
        assert!(!config.verbose);
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_unknown_format() {
        std::env::set_var("SOCIALDECK_LOG_FORMAT", "yaml");
        let config = LoggingConfig::from_env(true);
        std::env::remove_var("SOCIALDECK_LOG_FORMAT");

        assert_eq!(config.format, LogFormat::Text);
        assert!(config.verbose);
    }

    #[test]
    #[serial]
    fn test_for_cli_defaults_to_warn() {
        std::env::remove_var("SOCIALDECK_LOG_LEVEL");
        assert_eq!(LoggingConfig::for_cli(false).level, "warn");

        std::env::set_var("SOCIALDECK_LOG_LEVEL", "trace");
        let config = LoggingConfig::for_cli(false);
        std::env::remove_var("SOCIALDECK_LOG_LEVEL");
        assert_eq!(config.level, "trace");
    }
}
