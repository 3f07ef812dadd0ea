//! Host: owns the coordinator and the loaded plugins, drives the tick loop

use std::path::Path;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use kiln_message::{
    DispatcherScope, HandlerId, Message, MessageCoordinator, MessageHandler,
};
use kiln_plugin::{
    LoadedPlugin, PluginHost, PluginInstance, PluginMeta, PluginRegistry, Result,
};

#[cfg(feature = "hot-reload")]
use kiln_plugin::{ReloadConfig, ReloadWatcher};

/// Bridges the coordinator to a plugin's `on_message` hook.
///
/// Holds a weak reference so a torn-down plugin never lingers through the
/// handler list. Delivery uses `try_lock`: a plugin sending synchronously
/// from inside its own hook is skipped instead of deadlocking on itself.
struct PluginMessageHandler {
    instance: Weak<Mutex<PluginInstance>>,
}

impl MessageHandler for PluginMessageHandler {
    fn handle(&self, message: &mut Message) {
        if let Some(instance) = self.instance.upgrade() {
            match instance.try_lock() {
                Some(mut guard) => guard.receive_message(message),
                None => log::debug!(
                    "Skipping re-entrant delivery of message {} to a busy plugin",
                    message.id()
                ),
            }
        }
    }
}

struct ActivePlugin {
    loaded: LoadedPlugin,
    handler: Option<HandlerId>,
}

/// Application host: the composition root for the engine core.
///
/// Owns the message coordinator, the plugin registry, and every loaded
/// plugin. A single logical engine thread calls [`tick`] once per frame;
/// plugins run cooperatively inside it.
///
/// [`tick`]: Host::tick
pub struct Host {
    dispatcher: Arc<MessageCoordinator>,
    registry: Arc<PluginRegistry>,
    plugins: Vec<ActivePlugin>,
    #[cfg(feature = "hot-reload")]
    reload: Option<ReloadWatcher>,
}

impl Host {
    /// Create a host with an empty coordinator and registry
    pub fn new() -> Self {
        Self {
            dispatcher: Arc::new(MessageCoordinator::new()),
            registry: Arc::new(PluginRegistry::new()),
            plugins: Vec::new(),
            #[cfg(feature = "hot-reload")]
            reload: None,
        }
    }

    /// The host's message coordinator
    pub fn dispatcher(&self) -> &Arc<MessageCoordinator> {
        &self.dispatcher
    }

    /// The host's plugin registry
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// The service bundle handed to plugins at attach time
    pub fn plugin_host(&self) -> PluginHost {
        PluginHost::new(self.dispatcher.clone(), self.registry.clone())
    }

    /// Load and activate plugins from the manifests under `directory`.
    ///
    /// Plugins attach in load order, each registered as a coordinator handler
    /// so messages reach its `on_message` hook. Returns the number activated;
    /// failures stay in the plugin list with their error for reporting.
    pub fn load_plugins(&mut self, directory: &Path, requested_ids: &[String]) -> Result<usize> {
        let loaded = kiln_plugin::load_plugins(directory, requested_ids)?;

        let mut activated = 0;
        for plugin in loaded {
            if self.activate(plugin) {
                activated += 1;
            }
        }

        log::info!(
            "Activated {} plugin(s), {} failed",
            activated,
            self.plugins.len() - activated
        );
        Ok(activated)
    }

    fn activate(&mut self, loaded: LoadedPlugin) -> bool {
        let host = self.plugin_host();

        let handler = match loaded.instance() {
            Some(instance) => {
                loaded.attach(&host);
                Some(self.dispatcher.add_handler(Arc::new(PluginMessageHandler {
                    instance: Arc::downgrade(instance),
                })))
            }
            None => None,
        };

        #[cfg(feature = "hot-reload")]
        if handler.is_some() {
            if let (Some(watcher), Some(path)) = (&self.reload, &loaded.meta().module_path) {
                if let Err(e) = watcher.watch(path) {
                    log::warn!("Cannot watch '{}' for reload: {}", path.display(), e);
                }
            }
        }

        let active = handler.is_some();
        self.plugins.push(ActivePlugin { loaded, handler });
        active
    }

    /// Drive one engine tick.
    ///
    /// Establishes this host's coordinator as the thread's current
    /// dispatcher, updates every active plugin in load order, then drains the
    /// deferred message queue.
    pub fn tick(&mut self, delta_time: f32) {
        let _scope = DispatcherScope::enter(self.dispatcher.clone());

        for entry in &self.plugins {
            if let Some(instance) = entry.loaded.instance() {
                instance.lock().update(delta_time);
            }
        }

        self.dispatcher.process();
    }

    /// Number of plugins that loaded and attached
    pub fn active_count(&self) -> usize {
        self.plugins
            .iter()
            .filter(|entry| entry.loaded.is_loaded())
            .count()
    }

    /// Manifests of plugins that failed to load
    pub fn failed_plugins(&self) -> Vec<&PluginMeta> {
        self.plugins
            .iter()
            .filter(|entry| !entry.loaded.is_loaded())
            .map(|entry| entry.loaded.meta())
            .collect()
    }

    /// Look up a live plugin by name
    pub fn find_plugin(&self, name: &str) -> Option<kiln_plugin::PluginHandle> {
        self.registry.find_plugin(name)
    }

    /// Detach and unload every plugin in reverse load order, then drop all
    /// message handlers.
    pub fn shutdown(&mut self) {
        let host = self.plugin_host();

        while let Some(entry) = self.plugins.pop() {
            if let Some(handler) = entry.handler {
                self.dispatcher.remove_handler(handler);
            }
            entry.loaded.detach(&host);
            // Dropping the entry destroys the instance, then releases its library
        }

        self.dispatcher.clear();
        log::info!("Host shut down");
    }

    // ========== Hot-reload ==========

    /// Start watching loaded dynamic modules for on-disk changes
    #[cfg(feature = "hot-reload")]
    pub fn enable_hot_reload(&mut self, config: ReloadConfig) -> Result<()> {
        let watcher = ReloadWatcher::new(config)?;

        for entry in &self.plugins {
            if !entry.loaded.is_loaded() {
                continue;
            }
            if let Some(path) = &entry.loaded.meta().module_path {
                watcher.watch(path)?;
            }
        }

        self.reload = Some(watcher);
        Ok(())
    }

    /// Apply pending module swaps. Call between ticks.
    ///
    /// Each changed plugin is detached, destroyed through its old library,
    /// recreated from the new library with its snapshot state, and
    /// re-attached. Returns the number of plugins swapped.
    #[cfg(feature = "hot-reload")]
    pub fn poll_reloads(&mut self) -> usize {
        let due = match &self.reload {
            Some(watcher) => watcher.poll(),
            None => return 0,
        };
        if due.is_empty() {
            return 0;
        }

        let host = self.plugin_host();
        let mut swapped = 0;
        for entry in &mut self.plugins {
            let changed = entry
                .loaded
                .meta()
                .module_path
                .as_deref()
                .is_some_and(|path| due.iter().any(|d| d == path));
            if !changed {
                continue;
            }

            if let Some(handler) = entry.handler.take() {
                self.dispatcher.remove_handler(handler);
            }

            match entry.loaded.reload(&host) {
                Ok(()) => {
                    entry.loaded.attach(&host);
                    if let Some(instance) = entry.loaded.instance() {
                        entry.handler =
                            Some(self.dispatcher.add_handler(Arc::new(PluginMessageHandler {
                                instance: Arc::downgrade(instance),
                            })));
                    }
                    swapped += 1;
                }
                Err(e) => {
                    log::error!(
                        "Plugin '{}' left inactive after failed reload: {}",
                        entry.loaded.meta().id,
                        e
                    );
                }
            }
        }
        swapped
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        if !self.plugins.is_empty() {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("plugins", &self.plugins.len())
            .field("active", &self.active_count())
            .finish()
    }
}
