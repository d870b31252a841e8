//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject values that would be unsafe to use further down the line
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, on startup and on reload

use crate::config::schema::AppConfig;

/// A single semantic problem in a config document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("log.director must not be empty")]
    EmptyLogDirectory,

    #[error("log.format `{0}` is not one of console, json")]
    UnknownLogFormat(String),

    #[error("mysql.db-name `{0}` may only contain letters, digits, `_` and `$`")]
    UnsafeDatabaseName(String),

    #[error("system.max-connections must be greater than zero")]
    NoConnections,
}

/// Check a parsed document.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.log.director.trim().is_empty() {
        errors.push(ValidationError::EmptyLogDirectory);
    }

    if !matches!(config.log.format.as_str(), "console" | "json" | "") {
        errors.push(ValidationError::UnknownLogFormat(config.log.format.clone()));
    }

    // The name is interpolated into `CREATE DATABASE`, so keep it to a plain identifier.
    let db_name = &config.mysql.db_name;
    if !db_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    {
        errors.push(ValidationError::UnsafeDatabaseName(db_name.clone()));
    }

    if config.system.max_connections == 0 {
        errors.push(ValidationError::NoConnections);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
