//! Hot-reload support for dynamic plugin libraries
//!
//! Watches plugin module files for changes and surfaces debounced reload
//! candidates once per poll. The watcher only detects; the host performs the
//! actual swap via [`crate::loader::LoadedPlugin::reload`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};

use crate::error::{PluginError, Result};

/// Configuration for hot-reload
#[derive(Debug, Clone)]
pub struct ReloadConfig {
    /// Debounce duration (wait for file changes to settle)
    pub debounce: Duration,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
        }
    }
}

/// Watches plugin module files for on-disk changes.
pub struct ReloadWatcher {
    config: ReloadConfig,
    watcher: Option<Mutex<RecommendedWatcher>>,
    receiver: Option<Mutex<Receiver<notify::Result<Event>>>>,
    /// Module files being watched
    watched: RwLock<HashSet<PathBuf>>,
    /// Directories already handed to the watcher
    watched_dirs: RwLock<HashSet<PathBuf>>,
    /// Changed files waiting out the debounce window
    pending: RwLock<HashMap<PathBuf, Instant>>,
    enabled: bool,
}

impl ReloadWatcher {
    /// Create a watcher with the given configuration
    pub fn new(config: ReloadConfig) -> Result<Self> {
        let (tx, rx) = channel();

        let watcher = notify::recommended_watcher(move |result| {
            let _ = tx.send(result);
        })
        .map_err(|e| PluginError::InvalidState(format!("file watcher failed: {}", e)))?;

        Ok(Self {
            config,
            watcher: Some(Mutex::new(watcher)),
            receiver: Some(Mutex::new(rx)),
            watched: RwLock::new(HashSet::new()),
            watched_dirs: RwLock::new(HashSet::new()),
            pending: RwLock::new(HashMap::new()),
            enabled: true,
        })
    }

    /// Create a disabled watcher (for testing)
    pub fn disabled() -> Self {
        Self {
            config: ReloadConfig::default(),
            watcher: None,
            receiver: None,
            watched: RwLock::new(HashSet::new()),
            watched_dirs: RwLock::new(HashSet::new()),
            pending: RwLock::new(HashMap::new()),
            enabled: false,
        }
    }

    /// Check if hot-reload is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.watcher.is_some()
    }

    /// Start watching a module file for changes
    pub fn watch(&self, path: impl AsRef<Path>) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let path = path.as_ref().to_path_buf();
        if let (Some(watcher), Some(dir)) = (&self.watcher, path.parent()) {
            if self.watched_dirs.write().insert(dir.to_path_buf()) {
                watcher
                    .lock()
                    .watch(dir, RecursiveMode::NonRecursive)
                    .map_err(|e| {
                        PluginError::InvalidState(format!(
                            "cannot watch '{}': {}",
                            dir.display(),
                            e
                        ))
                    })?;
            }
        }

        log::debug!("Watching module for hot-reload: {}", path.display());
        self.watched.write().insert(path);
        Ok(())
    }

    /// Stop watching a module file
    pub fn unwatch(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.watched.write().remove(&path);
        self.pending.write().remove(&path);
    }

    /// Drain file events and return modules whose changes have settled.
    ///
    /// Call once per frame; each returned path is due for a reload.
    pub fn poll(&self) -> Vec<PathBuf> {
        if !self.is_enabled() {
            return Vec::new();
        }

        if let Some(receiver) = &self.receiver {
            let receiver = receiver.lock();
            while let Ok(result) = receiver.try_recv() {
                if let Ok(event) = result {
                    self.handle_event(&event);
                }
            }
        }

        let now = Instant::now();
        let due: Vec<PathBuf> = {
            let pending = self.pending.read();
            pending
                .iter()
                .filter(|(_, detected)| now.duration_since(**detected) >= self.config.debounce)
                .map(|(path, _)| path.clone())
                .collect()
        };

        if !due.is_empty() {
            let mut pending = self.pending.write();
            for path in &due {
                pending.remove(path);
            }
        }

        due
    }

    /// Manually queue a module for reload
    pub fn trigger(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        if self.watched.read().contains(&path) {
            self.pending.write().insert(path, Instant::now());
        }
    }

    /// Modules currently waiting out the debounce window
    pub fn pending_modules(&self) -> Vec<PathBuf> {
        self.pending.read().keys().cloned().collect()
    }

    /// Modules being watched
    pub fn watched_modules(&self) -> Vec<PathBuf> {
        self.watched.read().iter().cloned().collect()
    }

    fn handle_event(&self, event: &Event) {
        match event.kind {
            EventKind::Modify(_) | EventKind::Create(_) => {
                for path in &event.paths {
                    if is_module_file(path) && self.watched.read().contains(path) {
                        log::debug!("Detected change in module: {}", path.display());
                        self.pending.write().insert(path.clone(), Instant::now());
                    }
                }
            }
            _ => {}
        }
    }
}

impl std::fmt::Debug for ReloadWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadWatcher")
            .field("enabled", &self.is_enabled())
            .field("watched", &self.watched.read().len())
            .finish()
    }
}

/// Check if a path looks like a dynamic library
fn is_module_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("so") | Some("dll") | Some("dylib")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_watcher_is_inert() {
        let watcher = ReloadWatcher::disabled();
        assert!(!watcher.is_enabled());
        watcher.watch("plugins/liba.so").unwrap();
        assert!(watcher.watched_modules().is_empty());
        assert!(watcher.poll().is_empty());
    }

    #[test]
    fn test_is_module_file() {
        assert!(is_module_file(Path::new("libgame.so")));
        assert!(is_module_file(Path::new("game.dll")));
        assert!(is_module_file(Path::new("libgame.dylib")));
        assert!(!is_module_file(Path::new("game.toml")));
        assert!(!is_module_file(Path::new("libgame")));
    }

    #[test]
    fn test_trigger_respects_debounce() {
        let watcher = ReloadWatcher::new(ReloadConfig {
            debounce: Duration::from_millis(30),
        })
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let module = dir.path().join("libdemo.so");
        std::fs::write(&module, b"").unwrap();

        watcher.watch(&module).unwrap();
        watcher.trigger(&module);

        assert!(watcher.poll().is_empty());
        assert_eq!(watcher.pending_modules(), vec![module.clone()]);

        std::thread::sleep(Duration::from_millis(35));
        assert_eq!(watcher.poll(), vec![module]);
        assert!(watcher.pending_modules().is_empty());
    }
}
