//! Logging setup
//!
//! Console output always goes to stderr. When `logging.file` is set a second,
//! non-ANSI layer appends the same events to that file.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::Result;
use crate::config::LoggingConfig;

/// Map a configured level name to a tracing level directive
///
/// Accepts the names used by the config file (`WARNING`, `CRITICAL`) as well
/// as tracing's own. Unknown names fall back to `info`.
#[must_use]
pub fn level_directive(name: &str) -> &'static str {
    match name.trim().to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

/// Build the filter directive from config and command-line verbosity
///
/// Verbosity flags win over the configured level.
#[must_use]
pub fn filter_directive(config: &LoggingConfig, verbose: u8) -> String {
    match verbose {
        0 if !config.enabled => "error".to_string(),
        0 => {
            let level = level_directive(&config.level);
            format!("{level},polyglot={level}")
        }
        1 => "info,polyglot=debug".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global tracing subscriber
///
/// # Errors
///
/// Returns error if the log file cannot be opened
pub fn init(config: &LoggingConfig, verbose: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config, verbose)));

    let file_layer = match &config.file {
        Some(path) if config.enabled => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(level_directive("WARNING"), "warn");
        assert_eq!(level_directive("critical"), "error");
        assert_eq!(level_directive("Debug"), "debug");
        assert_eq!(level_directive("bogus"), "info");
    }

    #[test]
    fn test_disabled_logging_is_error_only() {
        let config = LoggingConfig {
            enabled: false,
            ..LoggingConfig::default()
        };
        assert_eq!(filter_directive(&config, 0), "error");
        assert_eq!(filter_directive(&config, 2), "debug");
    }

    #[test]
    fn test_configured_level() {
        let config = LoggingConfig {
            level: "DEBUG".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(filter_directive(&config, 0), "debug,polyglot=debug");
    }
}
