//! Backing store connectors.
//!
//! # Responsibilities
//! - Open handles for the relational, document and cache stores
//! - Keep the current handle of each kind in a process-wide slot
//!
//! # Data Flow
//! ```text
//! init option → connector::connect(config) → BackendSlot::init → handle
//! handler     → Backends::{mysql,redis,mongo}.get() → Arc<handle>
//! ```

pub mod mongo;
pub mod mysql;
pub mod redis;
pub mod slot;

pub use slot::{BackendError, BackendKind, BackendSlot};

use ::redis::aio::MultiplexedConnection;
use sqlx::MySqlPool;

/// One slot per backing store kind.
#[derive(Debug)]
pub struct Backends {
    pub mysql: BackendSlot<MySqlPool>,
    pub redis: BackendSlot<MultiplexedConnection>,
    pub mongo: BackendSlot<mongodb::Database>,
}

impl Backends {
    pub fn new() -> Self {
        Self {
            mysql: BackendSlot::new(BackendKind::Relational),
            redis: BackendSlot::new(BackendKind::Cache),
            mongo: BackendSlot::new(BackendKind::Document),
        }
    }
}

impl Default for Backends {
    fn default() -> Self {
        Self::new()
    }
}
