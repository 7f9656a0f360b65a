//! Configuration loading traits and types.
//!
//! The interceptor runs with built-in defaults; a host that wants to
//! narrow the intercepted set or size the alternate signal stack loads a
//! [`CatchConfig`] from TOML and hands it to `super_catch::configure`
//! before the first protected scope is entered.
//!
//! # Usage
//!
//! ```rust,no_run
//! use super_catch_common::config::{CatchConfig, ConfigError, ConfigLoader};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = CatchConfig::load(Path::new("super_catch.toml"))?;
//!     config.validate()?;
//!     println!("intercepting {} fault kinds", config.intercept.len());
//!     Ok(())
//! }
//! ```

use crate::consts::{DEFAULT_ALT_STACK_SIZE, MIN_ALT_STACK_SIZE};
use crate::fault::Fault;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_filter(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Interceptor configuration.
///
/// # TOML Example
///
/// ```toml
/// intercept = ["invalid_memory_access", "illegal_instruction", "process_abort"]
/// alt_stack_size = 131072
/// log_level = "debug"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatchConfig {
    /// Fault kinds whose signals get the interceptor's handler.
    pub intercept: Vec<Fault>,

    /// Bytes of alternate signal stack installed per thread on its first
    /// protected scope. `0` leaves the thread's signal stack alone.
    pub alt_stack_size: usize,

    /// Logging verbosity for hosts that initialise tracing from this file.
    pub log_level: LogLevel,
}

impl Default for CatchConfig {
    fn default() -> Self {
        Self {
            intercept: Fault::RECOGNISED.to_vec(),
            alt_stack_size: DEFAULT_ALT_STACK_SIZE,
            log_level: LogLevel::default(),
        }
    }
}

impl CatchConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `intercept` is empty, lists an unknown kind, or lists a kind twice
    /// - `alt_stack_size` is non-zero but below [`MIN_ALT_STACK_SIZE`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.intercept.is_empty() {
            return Err(ConfigError::ValidationError(
                "intercept must list at least one fault kind".to_string(),
            ));
        }

        for (i, fault) in self.intercept.iter().enumerate() {
            if let Fault::Unknown(code) = fault {
                return Err(ConfigError::ValidationError(format!(
                    "intercept lists unrecognised fault code {code}"
                )));
            }
            if self.intercept[..i].contains(fault) {
                return Err(ConfigError::ValidationError(format!(
                    "intercept lists '{fault}' more than once"
                )));
            }
        }

        if self.alt_stack_size != 0 && self.alt_stack_size < MIN_ALT_STACK_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "alt_stack_size {} is below the minimum of {MIN_ALT_STACK_SIZE} bytes",
                self.alt_stack_size
            )));
        }

        Ok(())
    }

    /// Whether `fault` is in the intercepted set.
    pub fn intercepts(&self, fault: Fault) -> bool {
        self.intercept.contains(&fault)
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation: any serde-deserializable struct can be loaded.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = CatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.intercept.len(), Fault::RECOGNISED.len());
        assert!(config.intercepts(Fault::InvalidMemoryAccess));
    }

    #[test]
    fn test_log_level_filters() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
        assert_eq!(LogLevel::Error.as_filter(), "error");
    }

    #[test]
    fn test_empty_intercept_rejected() {
        let config = CatchConfig {
            intercept: vec![],
            ..CatchConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_duplicate_intercept_rejected() {
        let config = CatchConfig {
            intercept: vec![Fault::Trap, Fault::BusError, Fault::Trap],
            ..CatchConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"), "got: {err}");
    }

    #[test]
    fn test_unknown_intercept_rejected() {
        let config = CatchConfig {
            intercept: vec![Fault::Unknown(libc::SIGUSR1)],
            ..CatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_small_alt_stack_rejected() {
        let mut config = CatchConfig {
            alt_stack_size: 4096,
            ..CatchConfig::default()
        };
        assert!(config.validate().is_err());

        config.alt_stack_size = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let result = CatchConfig::load(Path::new("/nonexistent/super_catch.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "intercept = [\"invalid_memory_access\", \"process_abort\"]").unwrap();

        let config = CatchConfig::load(file.path()).unwrap();
        assert_eq!(
            config.intercept,
            vec![Fault::InvalidMemoryAccess, Fault::ProcessAbort]
        );
        assert_eq!(config.alt_stack_size, DEFAULT_ALT_STACK_SIZE);
        assert_eq!(config.log_level, LogLevel::Info);
    }
}
