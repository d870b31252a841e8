//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! conf/<environment>/<name>.{json,yaml,ini}
//!     → loader.rs (resolve by extension priority, parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → store.rs (Arc snapshot shared with all subsystems)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of Arc<AppConfig>
//!     → on_change callback observes new config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - A reload that fails to parse or validate is logged and dropped

pub mod environment;
pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use environment::Environment;
pub use loader::{ConfigError, ConfigFormat, CONFIG_NAMESPACE, DEFAULT_CONFIG_NAME};
pub use schema::{AppConfig, LogConfig, MongoConfig, MysqlConfig, RedisConfig, SystemConfig};
pub use store::ConfigStore;
pub use watcher::ConfigWatcher;
