//! Relay Common - shared configuration, errors, and logging for the Relay
//! chat backend.
//!
//! This crate provides:
//! - Configuration types, file loading, and environment overrides
//! - Configuration validation (fatal at startup)
//! - The service error type
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Config, ContextConfig, LlmConfig, ObservabilityConfig, ServerConfig, StorageBackend,
    StorageConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
