//! Plugin contract and instance lifetime management
//!
//! A plugin implements the `on_*` hooks; [`PluginInstance`] wraps the live
//! object and enforces the attach/detach/update/receive-message lifecycle,
//! including destruction through the originating library's allocator for
//! dynamically loaded plugins.

use std::sync::Arc;

use kiln_message::{Message, MessageCoordinator, MessageResult};

use crate::library::SharedLibrary;
use crate::registry::PluginRegistry;

/// Factory exported by a dynamic plugin library as `<entry_point>_create`.
pub type PluginCreateFn = unsafe extern "C" fn() -> *mut dyn Plugin;

/// Destroyer exported by a dynamic plugin library as `<entry_point>_destroy`.
///
/// The instance must be returned to the library that created it so it is
/// freed by that library's allocator.
pub type PluginDestroyFn = unsafe extern "C" fn(*mut dyn Plugin);

/// A unit of runtime-attachable functionality.
///
/// Hooks have empty defaults; implement the ones the plugin cares about.
pub trait Plugin: Send {
    /// Runtime name, used as the registry key (case-insensitive)
    fn name(&self) -> &str;

    /// Called exactly once when the plugin is activated
    fn on_attach(&mut self, host: &PluginHost) {
        let _ = host;
    }

    /// Called when the plugin is deactivated
    fn on_detach(&mut self) {}

    /// Called once per engine tick while attached
    fn on_update(&mut self, delta_time: f32) {
        let _ = delta_time;
    }

    /// Called for each message when the plugin is registered as a handler
    fn on_message(&mut self, message: &mut Message) {
        let _ = message;
    }

    /// Serialize state to carry across a hot-reload
    fn snapshot(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Restore state preserved by [`Plugin::snapshot`] after a hot-reload
    fn restore(&mut self, state: &[u8]) {
        let _ = state;
    }
}

/// Services handed to a plugin at attach time.
///
/// Constructor-injected: the composition root builds one host and passes it
/// down, so the dependency flow stays explicit.
#[derive(Clone)]
pub struct PluginHost {
    dispatcher: Arc<MessageCoordinator>,
    registry: Arc<PluginRegistry>,
}

impl PluginHost {
    /// Create a host around a dispatcher and a registry
    pub fn new(dispatcher: Arc<MessageCoordinator>, registry: Arc<PluginRegistry>) -> Self {
        Self {
            dispatcher,
            registry,
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
}

/// A live plugin instance.
///
/// Owns the raw plugin object. For dynamically loaded plugins the destroyer
/// runs inside the originating library; the keep-alive library handle is the
/// last field so the instance is destroyed before the library can unload.
pub struct PluginInstance {
    raw: *mut dyn Plugin,
    destroy: Option<PluginDestroyFn>,
    attached: bool,
    dispatcher: Option<Arc<MessageCoordinator>>,
    /// Keeps the originating library loaded for as long as the instance lives
    library: Option<Arc<SharedLibrary>>,
}

// Safety: the raw pointer is owned exclusively by this instance and the
// underlying object is `Plugin: Send`.
unsafe impl Send for PluginInstance {}

impl PluginInstance {
    /// Wrap a plugin constructed in-process
    pub fn from_plugin(plugin: Box<dyn Plugin>) -> Self {
        Self {
            raw: Box::into_raw(plugin),
            destroy: None,
            attached: false,
            dispatcher: None,
            library: None,
        }
    }

    /// Wrap a plugin created by a dynamic library's factory.
    ///
    /// # Safety
    /// `raw` must be a valid owning pointer produced by the library backing
    /// `destroy`, and must not be used elsewhere after this call.
    pub(crate) unsafe fn from_raw(
        raw: *mut dyn Plugin,
        destroy: PluginDestroyFn,
        library: Arc<SharedLibrary>,
    ) -> Self {
        Self {
            raw,
            destroy: Some(destroy),
            attached: false,
            dispatcher: None,
            library: Some(library),
        }
    }

    fn plugin(&self) -> &dyn Plugin {
        unsafe { &*self.raw }
    }

    fn plugin_mut(&mut self) -> &mut dyn Plugin {
        unsafe { &mut *self.raw }
    }

    /// The plugin's runtime name
    pub fn name(&self) -> &str {
        self.plugin().name()
    }

    /// Check whether the plugin is currently attached
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Check whether the instance came from a dynamic library
    pub fn is_dynamic(&self) -> bool {
        self.library.is_some()
    }

    // ========== Lifecycle ==========

    /// Activate the plugin, capturing the host's dispatcher.
    ///
    /// Must not be called twice without an intervening [`detach`].
    ///
    /// [`detach`]: PluginInstance::detach
    pub fn attach(&mut self, host: &PluginHost) {
        debug_assert!(
            !self.attached,
            "plugin '{}' attached twice without detach",
            self.name()
        );
        self.dispatcher = Some(host.dispatcher().clone());
        self.attached = true;
        self.plugin_mut().on_attach(host);
        log::debug!("Attached plugin '{}'", self.name());
    }

    /// Deactivate the plugin and clear the captured dispatcher.
    pub fn detach(&mut self) {
        debug_assert!(
            self.attached,
            "plugin '{}' detached without attach",
            self.name()
        );
        self.plugin_mut().on_detach();
        self.dispatcher = None;
        self.attached = false;
        log::debug!("Detached plugin '{}'", self.name());
    }

    /// Forward an engine tick to the plugin
    pub fn update(&mut self, delta_time: f32) {
        debug_assert!(self.attached, "update on detached plugin '{}'", self.name());
        self.plugin_mut().on_update(delta_time);
    }

    /// Forward a message from the coordinator to the plugin
    pub fn receive_message(&mut self, message: &mut Message) {
        if !self.attached {
            return;
        }
        self.plugin_mut().on_message(message);
    }

    // ========== Dispatcher access ==========

    /// The captured dispatcher, or `None` while detached
    pub fn dispatcher(&self) -> Option<&Arc<MessageCoordinator>> {
        self.dispatcher.as_ref()
    }

    /// Send a message through the captured dispatcher.
    ///
    /// Panics if the plugin is detached; check [`dispatcher`] first when the
    /// attachment state is not known.
    ///
    /// [`dispatcher`]: PluginInstance::dispatcher
    pub fn send(&self, message: &mut Message) -> MessageResult {
        let dispatcher = self
            .dispatcher
            .as_ref()
            .expect("send through a detached plugin");
        dispatcher.send(message)
    }

    /// Post a message through the captured dispatcher.
    ///
    /// Panics if the plugin is detached.
    pub fn post(&self, message: Message) {
        let dispatcher = self
            .dispatcher
            .as_ref()
            .expect("post through a detached plugin");
        dispatcher.post(message);
    }

    // ========== Hot-reload state ==========

    /// Serialize the plugin's reload state
    pub fn snapshot(&self) -> Vec<u8> {
        self.plugin().snapshot()
    }

    /// Restore reload state into the plugin
    pub fn restore(&mut self, state: &[u8]) {
        self.plugin_mut().restore(state);
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        if self.attached {
            self.plugin_mut().on_detach();
            self.attached = false;
            self.dispatcher = None;
        }
        // The instance must die before the library handle in `self.library`
        match self.destroy {
            Some(destroy) => unsafe { destroy(self.raw) },
            None => unsafe {
                drop(Box::from_raw(self.raw));
            },
        }
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.name())
            .field("attached", &self.attached)
            .field("dynamic", &self.is_dynamic())
            .finish()
    }
}
