//! Deployment environment selection.
//!
//! The environment names the directory under the config namespace that
//! holds the service's documents (`conf/<environment>/main.json`, ...).

use std::fmt;
use std::str::FromStr;

use crate::config::loader::ConfigError;

/// Process environment variable consulted when the CLI value is invalid.
pub const ENVIRONMENT_VAR: &str = "SERVER_ENV";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Environment {
    /// Directory name under the config namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        }
    }

    /// Resolve the environment from a CLI value, falling back to
    /// `SERVER_ENV` when the value is not a known environment.
    pub fn resolve(cli_value: &str) -> Result<Self, ConfigError> {
        Self::resolve_with(cli_value, std::env::var(ENVIRONMENT_VAR).ok())
    }

    fn resolve_with(cli_value: &str, fallback: Option<String>) -> Result<Self, ConfigError> {
        if let Ok(env) = cli_value.parse() {
            return Ok(env);
        }
        match fallback {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidEnvironment(value)),
            None => Err(ConfigError::InvalidEnvironment(cli_value.to_string())),
        }
    }
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
