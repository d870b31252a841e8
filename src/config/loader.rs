//! Configuration loading from disk.
//!
//! # Responsibilities
//! - Resolve `<namespace>/<environment>/<base><ext>` against the fixed
//!   extension priority (`.json`, `.yaml`, `.ini`)
//! - Parse the chosen file with the format implied by its extension
//! - Run semantic validation before a document becomes a snapshot
//!
//! # Design Decisions
//! - First existing candidate wins; directory enumeration order never matters
//! - INI sections map onto config sections; values stay text and are coerced
//!   by the schema's lenient deserializers

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Directory (relative to the working directory) holding per-environment configs.
pub const CONFIG_NAMESPACE: &str = "conf";

/// Base name used when none is given on the command line.
pub const DEFAULT_CONFIG_NAME: &str = "main";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config file found, searched: {}", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse { path: PathBuf, source: ParseError },

    #[error("Validation failed: {}", display_all(.0))]
    Validation(Vec<ValidationError>),

    #[error("invalid environment `{0}`")]
    InvalidEnvironment(String),

    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),
}

/// Format-specific parse failure.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Ini(#[from] ini::ParseError),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_all(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Supported document formats, in lookup priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Ini,
}

impl ConfigFormat {
    /// Lookup order. Changing it changes which file wins on disk.
    pub const PRIORITY: [ConfigFormat; 3] = [ConfigFormat::Json, ConfigFormat::Yaml, ConfigFormat::Ini];

    /// File extension including the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => ".json",
            ConfigFormat::Yaml => ".yaml",
            ConfigFormat::Ini => ".ini",
        }
    }

    /// Infer the format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::PRIORITY
            .into_iter()
            .find(|format| format.extension()[1..].eq_ignore_ascii_case(ext))
    }

    /// Parse a document of this format.
    pub fn parse(&self, content: &str) -> Result<AppConfig, ParseError> {
        match self {
            ConfigFormat::Json => Ok(serde_json::from_str(content)?),
            ConfigFormat::Yaml => Ok(serde_yaml::from_str(content)?),
            ConfigFormat::Ini => {
                let document = ini::Ini::load_from_str(content)?;
                Ok(serde_json::from_value(ini_to_value(&document))?)
            }
        }
    }
}

/// Map an INI document onto the nested shape of [`AppConfig`].
///
/// Properties outside any section land at the top level.
fn ini_to_value(document: &ini::Ini) -> Value {
    let mut root = Map::new();
    for (section, properties) in document.iter() {
        let mut entries = Map::new();
        for (key, value) in properties.iter() {
            entries.insert(key.to_string(), Value::String(value.to_string()));
        }
        match section {
            Some(name) => {
                root.insert(name.to_string(), Value::Object(entries));
            }
            None => root.extend(entries),
        }
    }
    Value::Object(root)
}

/// Every path probed for `base_name` under `root/environment`, in priority order.
pub fn candidate_paths(root: &Path, environment: &str, base_name: &str) -> Vec<PathBuf> {
    let dir = root.join(environment);
    ConfigFormat::PRIORITY
        .iter()
        .map(|format| dir.join(format!("{}{}", base_name, format.extension())))
        .collect()
}

/// Pick the first existing candidate.
pub fn resolve_config_path(
    root: &Path,
    environment: &str,
    base_name: &str,
) -> Result<PathBuf, ConfigError> {
    let candidates = candidate_paths(root, environment, base_name);
    match candidates.iter().find(|path| path.is_file()) {
        Some(path) => Ok(path.clone()),
        None => Err(ConfigError::NotFound {
            searched: candidates,
        }),
    }
}

/// Load and validate configuration from a file, inferring its format.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    // Only paths produced by `resolve_config_path` reach here in practice;
    // anything else is read as JSON.
    let format = ConfigFormat::from_path(path).unwrap_or(ConfigFormat::Json);
    let config = format.parse(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Resolve, parse and validate the document for `environment`/`base_name`.
pub fn load(
    root: &Path,
    environment: &str,
    base_name: &str,
) -> Result<(PathBuf, AppConfig), ConfigError> {
    let path = resolve_config_path(root, environment, base_name)?;
    let config = load_config(&path)?;
    Ok((path, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn json_wins_over_yaml_and_ini() {
        let root = tempfile::tempdir().unwrap();
        let env_dir = root.path().join("testing");
        // Written lowest priority first so creation order cannot decide.
        write(&env_dir, "main.ini", "[system]\naddr = 7003\n");
        write(&env_dir, "main.yaml", "system:\n  addr: 7002\n");
        write(&env_dir, "main.json", r#"{"system": {"addr": 7001}}"#);

        let (path, config) = load(root.path(), "testing", "main").unwrap();
        assert_eq!(path, env_dir.join("main.json"));
        assert_eq!(config.system.addr, 7001);
    }

    #[test]
    fn yaml_wins_over_ini() {
        let root = tempfile::tempdir().unwrap();
        let env_dir = root.path().join("production");
        write(&env_dir, "main.ini", "[system]\naddr = 7003\n");
        write(&env_dir, "main.yaml", "system:\n  addr: 7002\n");

        let (path, config) = load(root.path(), "production", "main").unwrap();
        assert_eq!(path, env_dir.join("main.yaml"));
        assert_eq!(config.system.addr, 7002);
    }

    #[test]
    fn ini_sections_map_to_config() {
        let root = tempfile::tempdir().unwrap();
        let env_dir = root.path().join("testing");
        write(
            &env_dir,
            "main.ini",
            "[log]\nlevel = error\nlog-in-console = false\n\n[mysql]\npath = 10.0.0.5\nport = 3306\ndb-name = shop\npassword = 123456\n\n[redis]\ndb = 4\n",
        );

        let (_, config) = load(root.path(), "testing", "main").unwrap();
        assert_eq!(config.log.level, "error");
        assert!(!config.log.log_in_console);
        assert_eq!(config.mysql.path, "10.0.0.5");
        assert_eq!(config.mysql.db_name, "shop");
        assert_eq!(config.mysql.password, "123456");
        assert_eq!(config.redis.db, 4);
    }

    #[test]
    fn missing_file_reports_every_candidate() {
        let root = tempfile::tempdir().unwrap();
        let err = load(root.path(), "testing", "main").unwrap_err();
        match err {
            ConfigError::NotFound { searched } => {
                let names: Vec<_> = searched
                    .iter()
                    .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                    .collect();
                assert_eq!(names, ["main.json", "main.yaml", "main.ini"]);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let root = tempfile::tempdir().unwrap();
        let env_dir = root.path().join("testing");
        write(&env_dir, "main.json", "{ not json");

        let err = load(root.path(), "testing", "main").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { source: ParseError::Json(_), .. }));
    }

    #[test]
    fn other_base_names_are_independent() {
        let root = tempfile::tempdir().unwrap();
        let env_dir = root.path().join("testing");
        write(&env_dir, "main.json", r#"{"system": {"addr": 1}}"#);
        write(&env_dir, "worker.yaml", "system:\n  addr: 2\n");

        let (_, config) = load(root.path(), "testing", "worker").unwrap();
        assert_eq!(config.system.addr, 2);
    }
}
