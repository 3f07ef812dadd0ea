//! Plugin registry — name-based lookup of live plugin instances
//!
//! The registry never owns a plugin; ownership stays with whoever loaded it
//! (see [`crate::loader::LoadedPlugin`]). Entries are weak references added at
//! attach time and removed at detach time.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::plugin::PluginInstance;

/// Shared handle to a live plugin instance.
pub type PluginHandle = Arc<Mutex<PluginInstance>>;

/// Maps plugin names (case-insensitive) to live instances.
pub struct PluginRegistry {
    plugins: RwLock<BTreeMap<String, Weak<Mutex<PluginInstance>>>>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub const fn new() -> Self {
        Self {
            plugins: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a plugin under a name.
    ///
    /// Idempotent for the same instance. Registering a different live
    /// instance under an existing name replaces the mapping with a warning.
    pub fn register_plugin(&self, name: &str, instance: &PluginHandle) {
        let key = name.to_ascii_lowercase();
        let mut plugins = self.plugins.write();

        if let Some(existing) = plugins.get(&key) {
            if let Some(existing) = existing.upgrade() {
                if Arc::ptr_eq(&existing, instance) {
                    return;
                }
                log::warn!("Plugin name '{}' re-registered to a different instance", name);
            }
        }

        plugins.insert(key, Arc::downgrade(instance));
        log::debug!("Registered plugin '{}'", name);
    }

    /// Remove a name mapping, sweeping any aliases of the same instance.
    pub fn unregister_plugin(&self, name: &str) {
        let key = name.to_ascii_lowercase();
        let mut plugins = self.plugins.write();

        if let Some(removed) = plugins.remove(&key) {
            plugins.retain(|_, entry| !Weak::ptr_eq(entry, &removed) && entry.strong_count() > 0);
            log::debug!("Unregistered plugin '{}'", name);
        }
    }

    /// Remove every mapping pointing at the given instance.
    pub fn unregister_instance(&self, instance: &PluginHandle) {
        let target = Arc::downgrade(instance);
        self.plugins
            .write()
            .retain(|_, entry| !Weak::ptr_eq(entry, &target) && entry.strong_count() > 0);
    }

    /// Look up a live plugin by name. Returns `None` on miss or if the
    /// instance has been dropped.
    pub fn find_plugin(&self, name: &str) -> Option<PluginHandle> {
        let key = name.to_ascii_lowercase();
        self.plugins.read().get(&key)?.upgrade()
    }

    /// Names with a live instance, in sorted order
    pub fn names(&self) -> Vec<String> {
        self.plugins
            .read()
            .iter()
            .filter(|(_, entry)| entry.strong_count() > 0)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.plugins
            .read()
            .values()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }

    /// Check whether the registry has no live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}
