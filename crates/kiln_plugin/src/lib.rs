//! # kiln_plugin - Kiln Engine Plugin Runtime
//!
//! Lets units of functionality be loaded, attached, updated, and unloaded at
//! runtime, including from dynamically loaded native libraries. Plugins talk
//! to the rest of the engine exclusively through the message bus, so there is
//! no compile-time coupling between host and plugin.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │   plugin.toml   │────▶│  PluginLoader   │
//! │   (manifests)   │     │  (topo order)   │
//! └─────────────────┘     └────────┬────────┘
//!                                  │
//!                 ┌────────────────┼────────────────┐
//!                 ▼                                 ▼
//!        ┌─────────────────┐               ┌─────────────────┐
//!        │  SharedLibrary  │               │  static table   │
//!        │  (libloading)   │               │  (built-ins)    │
//!        └────────┬────────┘               └────────┬────────┘
//!                 └────────────────┬────────────────┘
//!                                  ▼
//!                         ┌─────────────────┐     ┌─────────────────┐
//!                         │  LoadedPlugin   │────▶│ PluginRegistry  │
//!                         │ (owns instance) │     │ (name lookup)   │
//!                         └─────────────────┘     └─────────────────┘
//! ```
//!
//! A plugin created inside a dynamic library is destroyed through that
//! library's exported destroyer before the library is unloaded; the
//! [`PluginInstance`] wrapper sequences this.
//!
//! ## Example
//!
//! ```
//! use kiln_plugin::{Plugin, PluginHost};
//!
//! #[derive(Default)]
//! struct FrameCounter {
//!     frames: u64,
//! }
//!
//! impl Plugin for FrameCounter {
//!     fn name(&self) -> &str {
//!         "frame-counter"
//!     }
//!
//!     fn on_update(&mut self, _delta_time: f32) {
//!         self.frames += 1;
//!     }
//! }
//! ```

pub mod error;
pub mod library;
pub mod loader;
pub mod manifest;
pub mod plugin;
pub mod registry;
pub mod static_registry;
pub mod version;

#[cfg(feature = "hot-reload")]
pub mod reload;

pub use error::{PluginError, Result};
pub use library::SharedLibrary;
pub use loader::{load_plugins, LoadedPlugin};
pub use manifest::{load_manifest, parse_manifest, scan_manifests, PluginMeta};
pub use plugin::{Plugin, PluginCreateFn, PluginDestroyFn, PluginHost, PluginInstance};
pub use registry::{PluginHandle, PluginRegistry};
pub use static_registry::{
    register_static_plugin, static_entry_points, static_factory, StaticPluginFactory,
    StaticPluginRegistration,
};
pub use version::Version;

#[cfg(feature = "hot-reload")]
pub use reload::{ReloadConfig, ReloadWatcher};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{PluginError, Result};
    pub use crate::library::SharedLibrary;
    pub use crate::loader::{load_plugins, LoadedPlugin};
    pub use crate::manifest::PluginMeta;
    pub use crate::plugin::{Plugin, PluginHost, PluginInstance};
    pub use crate::registry::{PluginHandle, PluginRegistry};
    pub use crate::static_registry::StaticPluginRegistration;
    pub use crate::version::Version;

    #[cfg(feature = "hot-reload")]
    pub use crate::reload::{ReloadConfig, ReloadWatcher};
}
