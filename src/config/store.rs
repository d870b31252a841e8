//! Process-wide configuration snapshot.
//!
//! # Responsibilities
//! - Hold the current [`AppConfig`] snapshot
//! - Replace it wholesale on reload
//! - Hand out cheap `Arc` snapshots to concurrent readers
//!
//! # Design Decisions
//! - `ArcSwap` gives lock-free reads; a reader sees the old or the new
//!   snapshot, never a partially parsed one
//! - Writers (reload, replace) are serialized by a mutex so a slow reparse
//!   cannot be overtaken by an older one
//! - Superseded snapshots are dropped once the last reader releases them

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::config::loader::{self, ConfigError};
use crate::config::schema::AppConfig;
use crate::config::watcher::ConfigWatcher;

/// Holder of the current configuration snapshot.
#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: ArcSwap<AppConfig>,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    /// Store seeded with an in-memory snapshot and no backing file.
    pub fn new(config: AppConfig) -> Self {
        Self {
            path: None,
            current: ArcSwap::from_pointee(config),
            write_lock: Mutex::new(()),
        }
    }

    /// Store backed by a specific file.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = loader::load_config(&path)?;
        Ok(Self {
            path: Some(path),
            current: ArcSwap::from_pointee(config),
            write_lock: Mutex::new(()),
        })
    }

    /// Resolve `<root>/<environment>/<base_name>.{json,yaml,ini}` and load it.
    pub fn load(root: &Path, environment: &str, base_name: &str) -> Result<Self, ConfigError> {
        Self::from_file(loader::resolve_config_path(root, environment, base_name)?)
    }

    /// File the snapshot was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<AppConfig> {
        self.current.load_full()
    }

    /// Swap in a new snapshot, returning the one it replaced.
    pub fn replace(&self, config: AppConfig) -> Arc<AppConfig> {
        let _guard = self.write_lock.lock();
        self.current.swap(Arc::new(config))
    }

    /// Reparse the backing file and swap the result in.
    ///
    /// On failure the current snapshot is left untouched.
    pub fn reload(&self) -> Result<Arc<AppConfig>, ConfigError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(self.snapshot());
        };

        let _guard = self.write_lock.lock();
        let config = Arc::new(loader::load_config(path)?);
        self.current.store(Arc::clone(&config));
        Ok(config)
    }

    /// Watch the backing file and reload on every write.
    ///
    /// `on_change` runs on the watcher thread after each successful swap.
    /// Dropping the returned watcher stops watching.
    pub fn watch<F>(self: &Arc<Self>, on_change: F) -> Result<ConfigWatcher, ConfigError>
    where
        F: Fn(Arc<AppConfig>) + Send + 'static,
    {
        ConfigWatcher::start(Arc::clone(self), on_change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn replace_returns_previous_snapshot() {
        let store = ConfigStore::new(AppConfig::default());
        let before = store.snapshot();

        let mut next = AppConfig::default();
        next.system.addr = 9999;
        let previous = store.replace(next);

        assert!(Arc::ptr_eq(&before, &previous));
        assert_eq!(store.snapshot().system.addr, 9999);
        // Readers holding the old snapshot keep a consistent view
        assert_eq!(before.system.addr, 8080);
    }

    #[test]
    fn failed_reload_keeps_current_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.json");
        fs::write(&path, r#"{"system": {"addr": 7100}}"#).unwrap();

        let store = ConfigStore::from_file(&path).unwrap();
        fs::write(&path, "{ broken").unwrap();

        assert!(store.reload().is_err());
        assert_eq!(store.snapshot().system.addr, 7100);

        fs::write(&path, r#"{"system": {"addr": 7200}}"#).unwrap();
        assert_eq!(store.reload().unwrap().system.addr, 7200);
        assert_eq!(store.snapshot().system.addr, 7200);
    }

    #[test]
    fn in_memory_store_reload_is_a_noop() {
        let store = ConfigStore::new(AppConfig::default());
        let before = store.snapshot();
        let after = store.reload().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(store.path().is_none());
    }

    #[test]
    fn load_remembers_resolved_file() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("testing");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("main.yaml"), "system:\n  addr: 7070\n").unwrap();
        fs::write(dir.join("main.ini"), "[system]\naddr = 6060\n").unwrap();

        let store = ConfigStore::load(root.path(), "testing", "main").unwrap();
        assert_eq!(store.path(), Some(dir.join("main.yaml").as_path()));
        assert_eq!(store.snapshot().system.addr, 7070);
    }
}
