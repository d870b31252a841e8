//! Configuration file watcher for hot reload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::loader::ConfigError;
use crate::config::schema::AppConfig;
use crate::config::store::ConfigStore;
use crate::observability::metrics;

/// A watcher that reloads a [`ConfigStore`] whenever its file changes.
///
/// The parent directory is watched rather than the file itself so that
/// editors which save by renaming a temporary file are still picked up.
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching the store's backing file in a background thread.
    pub fn start<F>(store: Arc<ConfigStore>, on_change: F) -> Result<Self, ConfigError>
    where
        F: Fn(Arc<AppConfig>) + Send + 'static,
    {
        let path = match store.path() {
            Some(path) => path.to_path_buf(),
            None => {
                return Err(ConfigError::Watch(notify::Error::generic(
                    "config store has no backing file",
                )))
            }
        };
        let file_name: Option<OsString> = path.file_name().map(ToOwned::to_owned);
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    if !touches(&event, file_name.as_deref()) {
                        return;
                    }
                    tracing::info!("Config file change detected, reloading...");
                    match store.reload() {
                        Ok(snapshot) => {
                            metrics::record_config_reload(true);
                            on_change(snapshot);
                        }
                        Err(e) => {
                            metrics::record_config_reload(false);
                            tracing::error!(
                                "Failed to reload config: {}. Keeping current configuration.",
                                e
                            );
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(Self {
            path,
            _watcher: watcher,
        })
    }

    /// The file being watched.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn touches(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    match file_name {
        Some(name) => event.paths.iter().any(|p| p.file_name() == Some(name)),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::mpsc;

    #[test]
    fn reload_on_write_and_survive_bad_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.yaml");
        fs::write(&path, "system:\n  addr: 7300\n").unwrap();

        let store = Arc::new(ConfigStore::from_file(&path).unwrap());
        let (tx, rx) = mpsc::channel();
        let _watcher = store
            .watch(move |snapshot| {
                let _ = tx.send(snapshot.system.addr);
            })
            .unwrap();

        // A broken document never reaches the callback
        fs::write(&path, "system: [unterminated\n").unwrap();
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(store.snapshot().system.addr, 7300);

        fs::write(&path, "system:\n  addr: 7301\n").unwrap();
        let mut seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        while seen != 7301 {
            seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(store.snapshot().system.addr, 7301);
    }

    #[test]
    fn in_memory_store_cannot_be_watched() {
        let store = Arc::new(ConfigStore::new(AppConfig::default()));
        assert!(matches!(store.watch(|_| {}), Err(ConfigError::Watch(_))));
    }
}
