//! Configuration file loading
//!
//! Supports `~/.config/polyglot/config.json` as the persistent config source.
//! Files ending in `.toml` are parsed as TOML, everything else as JSON.

use std::path::{Path, PathBuf};

use super::Config;
use crate::{Error, Result};

/// Read and parse a configuration file
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn read_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read {}: {e}", path.display()))
    })?;

    let config = if is_toml(path) {
        Config::from_toml_str(&content)?
    } else {
        Config::from_json_str(&content)?
    };

    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Write a configuration file, creating parent directories
///
/// # Errors
///
/// Returns error if serialization or writing fails
pub fn write_config_file(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let content = if is_toml(path) {
        toml::to_string_pretty(config).map_err(|e| Error::Config(e.to_string()))?
    } else {
        serde_json::to_string_pretty(config)?
    };

    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "wrote config file");
    Ok(())
}

/// Return the config file path: `~/.config/polyglot/config.json`
///
/// `POLYGLOT_CONFIG` overrides the location.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("POLYGLOT_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("polyglot").join("config.json"))
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.wake_word = "athena".to_string();
        write_config_file(&path, &config).unwrap();

        let loaded = read_config_file(&path).unwrap();
        assert_eq!(loaded.wake_word, "athena");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_config_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = read_config_file(&path).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_toml_extension_detected() {
        assert!(is_toml(Path::new("config.TOML")));
        assert!(!is_toml(Path::new("config.json")));
    }
}
