//! Static plugin registration
//!
//! Plugins compiled directly into the host binary register a factory here,
//! keyed by the same entry-point identifier a dynamic library would export.
//! The loader resolves manifests with no `module` path through this table, so
//! static and dynamic plugins share one loading path.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::plugin::Plugin;

/// Factory for a statically linked plugin.
pub type StaticPluginFactory = fn() -> Box<dyn Plugin>;

static STATIC_PLUGINS: RwLock<BTreeMap<String, StaticPluginFactory>> =
    RwLock::new(BTreeMap::new());

/// Register a factory for an entry point.
///
/// Call from the host's startup path, before any `load_plugins` that refers
/// to the entry point. Re-registering replaces the factory with a warning.
pub fn register_static_plugin(entry_point: impl Into<String>, factory: StaticPluginFactory) {
    let entry_point = entry_point.into();
    let previous = STATIC_PLUGINS.write().insert(entry_point.clone(), factory);
    if previous.is_some() {
        log::warn!("Static plugin entry point '{}' re-registered", entry_point);
    } else {
        log::debug!("Registered static plugin entry point '{}'", entry_point);
    }
}

/// Look up the factory registered for an entry point
pub fn static_factory(entry_point: &str) -> Option<StaticPluginFactory> {
    STATIC_PLUGINS.read().get(entry_point).copied()
}

/// Entry points with a registered factory, in sorted order
pub fn static_entry_points() -> Vec<String> {
    STATIC_PLUGINS.read().keys().cloned().collect()
}

/// Registration object for static plugins.
///
/// Hold one per built-in plugin at the composition root:
///
/// ```ignore
/// let _input = StaticPluginRegistration::new("input_sdl", || Box::new(SdlInput::default()));
/// ```
pub struct StaticPluginRegistration {
    entry_point: String,
}

impl StaticPluginRegistration {
    /// Register `factory` under `entry_point`
    pub fn new(entry_point: impl Into<String>, factory: StaticPluginFactory) -> Self {
        let entry_point = entry_point.into();
        register_static_plugin(entry_point.clone(), factory);
        Self { entry_point }
    }

    /// The registered entry point
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}
