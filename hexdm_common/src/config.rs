//! TOML configuration plumbing shared by every HexDM config type.
//!
//! A config type derives `Deserialize`, opts into [`ConfigLoader`] with an
//! empty impl, and runs its own `validate()` after loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::consts::HEXDM_SERVICE_NAME;

/// Why a configuration could not be used.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// No file at the given path.
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// File exists but could not be read.
    #[error("Cannot read {}: {reason}", path.display())]
    Unreadable {
        /// File that failed
        path: PathBuf,
        /// OS error text
        reason: String,
    },

    /// Not valid TOML, or a key has the wrong type.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Parsed, but the values are inconsistent.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// `[shared] log_level`, lowercase in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// `[shared]` section: logging and the instance name used in log lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SharedConfig {
    /// Default log level; `RUST_LOG` directives still apply on top.
    pub log_level: LogLevel,
    /// Instance name, e.g. one per bench when several servers share a host.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: HEXDM_SERVICE_NAME.to_string(),
        }
    }
}

impl SharedConfig {
    /// `service_name` must be non-empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "shared.service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read a config type from TOML. Validation is left to the caller.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Read and parse `path`.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.to_path_buf()),
            _ => ConfigError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;
        Self::from_toml(&content)
    }

    /// Parse an in-memory document.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[derive(Debug, Deserialize)]
    struct Section {
        #[serde(default)]
        shared: SharedConfig,
        channel: usize,
    }

    impl ConfigLoader for Section {}

    #[test]
    fn test_log_level_parsing() {
        let section: SharedConfig = toml::from_str("log_level = \"trace\"").unwrap();
        assert_eq!(section.log_level, LogLevel::Trace);
        assert_eq!(section.service_name, "hexdm");
        assert_eq!(tracing::Level::from(LogLevel::Warn), tracing::Level::WARN);

        assert!(toml::from_str::<SharedConfig>("log_level = \"loud\"").is_err());
        assert!(toml::from_str::<SharedConfig>("colour = true").is_err());
    }

    #[test]
    fn test_blank_service_name_rejected() {
        let shared = SharedConfig {
            service_name: "  ".to_string(),
            ..SharedConfig::default()
        };
        assert!(matches!(shared.validate(), Err(ConfigError::ValidationError(_))));
        assert!(SharedConfig::default().validate().is_ok());
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let missing = Path::new("/nonexistent/hexdm.toml");
        let err = Section::load(missing).unwrap_err();
        assert!(matches!(&err, ConfigError::FileNotFound(path) if path == missing));
        assert!(err.to_string().contains("/nonexistent/hexdm.toml"));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "channel = [").unwrap();
        assert!(matches!(Section::load(file.path()), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_reads_shared_section() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "channel = 3\n\n[shared]\nlog_level = \"debug\"\nservice_name = \"bench-2\"\n").unwrap();

        let section = Section::load(file.path()).unwrap();
        assert_eq!(section.channel, 3);
        assert_eq!(section.shared.log_level, LogLevel::Debug);
        assert_eq!(section.shared.service_name, "bench-2");
    }
}
