//! Configuration validation.
//!
//! A configuration that fails validation must stop the process before it
//! starts serving.

use thiserror::Error;

use crate::config::{
    Config, LlmConfig, ObservabilityConfig, ServerConfig, StorageBackend, StorageConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {}", join_messages(.0))]
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Fold a list of failures into one result.
    pub fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 4] =
            [&self.server, &self.llm, &self.storage, &self.observability];

        let errors: Vec<ValidationError> = sections
            .iter()
            .filter_map(|section| section.validate().err())
            .collect();

        ValidationError::collect(errors)
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "server.port".into(),
            });
        }
        if self.bind.parse::<std::net::IpAddr>().is_err() {
            return Err(ValidationError::InvalidValue {
                field: "server.bind".into(),
                reason: format!("'{}' is not an IP address", self.bind),
            });
        }
        Ok(())
    }
}

impl Validate for LlmConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(ValidationError::MissingField {
                field: "llm.api_key (set OPENROUTER_API_KEY)".into(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "llm.model".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::InvalidValue {
                field: "llm.temperature".into(),
                reason: "must be between 0.0 and 2.0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for StorageConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.backend == StorageBackend::Sqlite
            && self.url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            return Err(ValidationError::MissingField {
                field: "storage.url (set RELAY_DATABASE_URL for the sqlite backend)".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}
