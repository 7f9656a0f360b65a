//! Error types for interceptor setup and fault recovery.

use crate::exception::FaultException;
use super_catch_common::config::ConfigError;
use thiserror::Error;

/// Errors surfaced by the interceptor's public API.
#[derive(Error, Debug)]
pub enum CatchError {
    /// `configure` was called after the handlers were installed.
    #[error("Fault handlers are already installed - configure before the first protected scope")]
    AlreadyInstalled,

    /// `configure` was called twice.
    #[error("Interceptor configuration was already set")]
    AlreadyConfigured,

    /// The supplied configuration failed validation.
    #[error("Invalid configuration: {source}")]
    Config {
        /// Source config error
        #[from]
        source: ConfigError,
    },

    /// A fault was intercepted inside a protected scope.
    #[error("Fault intercepted: {source}")]
    Fault {
        /// The typed exception
        #[from]
        source: FaultException,
    },
}

/// Result type for interceptor operations
pub type CatchResult<T> = Result<T, CatchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{protect, trigger};
    use super_catch_common::fault::Fault;

    fn faulting_step() -> CatchResult<u32> {
        let value = protect(|| {
            trigger::illegal_instruction();
            1
        })?;
        Ok(value)
    }

    #[test]
    fn fault_converts_with_question_mark() {
        match faulting_step() {
            Err(CatchError::Fault { source }) => {
                assert_eq!(source.kind(), Fault::IllegalInstruction)
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn config_error_message() {
        let err = CatchError::from(ConfigError::ValidationError("bad".to_string()));
        assert_eq!(
            err.to_string(),
            "Invalid configuration: Configuration validation failed: bad"
        );
    }
}
