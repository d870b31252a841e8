//! Process-wide slot holding one backend handle.
//!
//! # Responsibilities
//! - Hold the last successfully opened handle for one backend kind
//! - Replace it only when a new open succeeds
//! - Report `NotInitialized` instead of handing out an unusable value
//!
//! # Design Decisions
//! - Lock-free reads (`ArcSwapOption`); `init` calls are serialized by an
//!   async writer lock so two connects never race to install
//! - A failed `init` keeps the previous handle: stale-but-working beats none

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;

use crate::observability::metrics;

/// Kind of backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Relational store (MySQL).
    Relational,
    /// Document store (MongoDB).
    Document,
    /// Key-value cache (Redis).
    Cache,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Relational => "mysql",
            BackendKind::Document => "mongo",
            BackendKind::Cache => "redis",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for backend access.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to initialize {kind}: {source}")]
    Init {
        kind: BackendKind,
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{0} is not initialized")]
    NotInitialized(BackendKind),
}

/// Slot for the current handle of one backend kind.
pub struct BackendSlot<H> {
    kind: BackendKind,
    current: ArcSwapOption<H>,
    write_lock: Mutex<()>,
}

impl<H> BackendSlot<H> {
    /// Empty slot.
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            current: ArcSwapOption::empty(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Open a new handle with `open` and install it on success.
    pub async fn init<F, Fut, E>(&self, open: F) -> Result<Arc<H>, BackendError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<H, E>>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let _guard = self.write_lock.lock().await;
        match open().await {
            Ok(handle) => {
                let handle = Arc::new(handle);
                self.current.store(Some(Arc::clone(&handle)));
                metrics::record_backend_init(self.kind.as_str(), true);
                Ok(handle)
            }
            Err(e) => {
                metrics::record_backend_init(self.kind.as_str(), false);
                Err(BackendError::Init {
                    kind: self.kind,
                    source: e.into(),
                })
            }
        }
    }

    /// Current handle.
    pub fn get(&self) -> Result<Arc<H>, BackendError> {
        self.current
            .load_full()
            .ok_or(BackendError::NotInitialized(self.kind))
    }

    pub fn is_initialized(&self) -> bool {
        self.current.load().is_some()
    }
}

impl<H> fmt::Debug for BackendSlot<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSlot")
            .field("kind", &self.kind)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
