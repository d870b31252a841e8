//! Bootstrap harness for HTTP services.
//!
//! Loads environment-specific configuration, wires tiered logging, connects
//! the optional backing stores and runs an HTTP listener with ordered
//! startup hooks and graceful shutdown.

pub mod backend;
pub mod cli;
pub mod config;
pub mod context;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use backend::{BackendError, BackendKind, Backends};
pub use config::{AppConfig, ConfigError, ConfigStore, Environment};
pub use context::AppContext;
pub use http::{Pipeline, Server, ServerError, ServerSettings};
pub use lifecycle::{HookResult, InitOption, LifecycleState};
