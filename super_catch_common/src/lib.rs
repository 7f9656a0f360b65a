//! super_catch Common Library
//!
//! Shared types for the super_catch workspace: the fault taxonomy, the
//! error-domain abstraction that lets fault identities travel through
//! generic error handling, workspace constants and TOML configuration.
//!
//! # Module Structure
//!
//! - [`fault`] - Recognised fault kinds and signal names
//! - [`domain`] - Comparable error codes qualified by a named domain
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Workspace-wide constants
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use super_catch_common::prelude::*;
//!
//! let code = ErrorCode::from(Fault::InvalidMemoryAccess);
//! assert_eq!(code, Fault::InvalidMemoryAccess);
//! assert_eq!(code.message(), "segmentation");
//! ```

#![deny(missing_docs)]

#[cfg(not(unix))]
compile_error!("super_catch supports POSIX targets only");

pub mod config;
pub mod consts;
pub mod domain;
pub mod fault;
pub mod prelude;
