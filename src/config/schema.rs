//! Configuration schema definitions.
//!
//! This module defines the complete configuration document for a service.
//! All types derive Serde traits for deserialization from JSON, YAML or INI
//! files. Keys are kebab-case; the camelCase spellings used by older JSON
//! documents are accepted as aliases.

use serde::{Deserialize, Serialize};

/// Root configuration for a bootstrapped service.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Logging settings.
    pub log: LogConfig,

    /// Process-level settings (listen port, shutdown timings).
    pub system: SystemConfig,

    /// Relational store connection parameters.
    pub mysql: MysqlConfig,

    /// Key-value cache connection parameters.
    pub redis: RedisConfig,

    /// Document store connection parameters.
    pub mongo: MongoConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct LogConfig {
    /// Minimum level (debug, info, warn, error). Unknown values mean debug.
    pub level: String,

    /// Record format: `json` or `console`.
    pub format: String,

    /// Text prepended to every timestamp.
    pub prefix: String,

    /// Directory holding the `server_<tier>.log` files.
    pub director: String,

    /// Include source file and line in records.
    #[serde(alias = "showLine", deserialize_with = "lenient::boolean")]
    pub show_line: bool,

    /// Level encoder name; names containing `Color` enable ANSI output.
    #[serde(alias = "encodeLevel")]
    pub encode_level: String,

    /// Field name used for captured stack traces.
    #[serde(alias = "stacktraceKey")]
    pub stacktrace_key: String,

    /// Echo every destination to stdout.
    #[serde(alias = "logInConsole", deserialize_with = "lenient::boolean")]
    pub log_in_console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "console".to_string(),
            prefix: "[Log]".to_string(),
            director: "logs".to_string(),
            show_line: false,
            encode_level: "LowercaseLevelEncoder".to_string(),
            stacktrace_key: "stacktrace".to_string(),
            log_in_console: true,
        }
    }
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SystemConfig {
    /// Environment name recorded in the document (informational).
    #[serde(deserialize_with = "lenient::string")]
    pub env: String,

    /// Port the HTTP listener binds to on all interfaces.
    #[serde(deserialize_with = "lenient::number")]
    pub addr: u16,

    /// Storage backend for uploads (informational).
    #[serde(alias = "uploadType", deserialize_with = "lenient::string")]
    pub upload_type: String,

    /// Service version string.
    #[serde(deserialize_with = "lenient::string")]
    pub version: String,

    /// Wait after shutdown hooks, before the listener closes.
    #[serde(deserialize_with = "lenient::number")]
    pub grace_interval_ms: u64,

    /// Upper bound for the whole shutdown sequence.
    #[serde(deserialize_with = "lenient::number")]
    pub shutdown_max_age_secs: u64,

    /// Maximum concurrent connections (backpressure).
    #[serde(deserialize_with = "lenient::number")]
    pub max_connections: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            env: "testing".to_string(),
            addr: 8080,
            upload_type: "local".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            grace_interval_ms: 1000,
            shutdown_max_age_secs: 15,
            max_connections: 10_000,
        }
    }
}

/// Relational store (MySQL) configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct MysqlConfig {
    /// Server host. Empty disables the store in the bundled binary.
    #[serde(deserialize_with = "lenient::string")]
    pub path: String,

    /// Server port.
    #[serde(deserialize_with = "lenient::string")]
    pub port: String,

    /// Extra connection options appended as a query string.
    #[serde(deserialize_with = "lenient::string")]
    pub config: String,

    /// Database name, created on first connect if missing.
    #[serde(alias = "dbname", deserialize_with = "lenient::string")]
    pub db_name: String,

    #[serde(deserialize_with = "lenient::string")]
    pub username: String,

    #[serde(deserialize_with = "lenient::string")]
    pub password: String,

    /// Pool size upper bound.
    #[serde(alias = "maxOpenConns", deserialize_with = "lenient::number")]
    pub max_open_conns: u32,
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            port: String::new(),
            config: String::new(),
            db_name: String::new(),
            username: String::new(),
            password: String::new(),
            max_open_conns: 100,
        }
    }
}

impl MysqlConfig {
    /// Configured host, or loopback when unset.
    pub fn host_or_default(&self) -> &str {
        if self.path.is_empty() {
            "127.0.0.1"
        } else {
            &self.path
        }
    }

    /// Configured port, or 3306 when unset.
    pub fn port_or_default(&self) -> &str {
        if self.port.is_empty() {
            "3306"
        } else {
            &self.port
        }
    }
}

/// Key-value cache (Redis) configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RedisConfig {
    /// Logical database index.
    #[serde(deserialize_with = "lenient::number")]
    pub db: i64,

    /// `host:port`. Empty disables the store in the bundled binary.
    #[serde(deserialize_with = "lenient::string")]
    pub addr: String,

    #[serde(deserialize_with = "lenient::string")]
    pub password: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            db: 0,
            addr: String::new(),
            password: String::new(),
        }
    }
}

/// Document store (MongoDB) configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct MongoConfig {
    /// Server host. Empty disables the store in the bundled binary.
    #[serde(deserialize_with = "lenient::string")]
    pub host: String,

    #[serde(deserialize_with = "lenient::string")]
    pub port: String,

    #[serde(deserialize_with = "lenient::string")]
    pub user: String,

    #[serde(deserialize_with = "lenient::string")]
    pub password: String,

    /// Database name; also the authentication source.
    #[serde(rename = "db", deserialize_with = "lenient::string")]
    pub db_name: String,
}

/// Deserializers that accept both native scalars and their text form.
///
/// INI documents only carry text, while JSON and YAML documents carry
/// native numbers and booleans (and sometimes numeric passwords).
mod lenient {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Bool(bool),
        Int(i64),
        Uint(u64),
        Float(f64),
        Text(String),
    }

    impl Scalar {
        fn into_text(self) -> String {
            match self {
                Scalar::Bool(b) => b.to_string(),
                Scalar::Int(i) => i.to_string(),
                Scalar::Uint(u) => u.to_string(),
                Scalar::Float(f) => f.to_string(),
                Scalar::Text(s) => s,
            }
        }
    }

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Scalar>::deserialize(deserializer)?
            .map(Scalar::into_text)
            .unwrap_or_default())
    }

    pub fn boolean<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Scalar::deserialize(deserializer)? {
            Scalar::Bool(b) => Ok(b),
            Scalar::Int(i) => Ok(i != 0),
            Scalar::Uint(u) => Ok(u != 0),
            Scalar::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" | "" => Ok(false),
                other => Err(D::Error::custom(format!("invalid boolean `{}`", other))),
            },
            Scalar::Float(f) => Err(D::Error::custom(format!("invalid boolean `{}`", f))),
        }
    }

    pub fn number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        let text = Scalar::deserialize(deserializer)?.into_text();
        text.trim().parse::<T>().map_err(D::Error::custom)
    }
}
