//! # kiln_runtime - Kiln Engine Host Runtime
//!
//! The composition root tying the message bus and the plugin loader into a
//! running application:
//!
//! ```text
//! Host::load_plugins ──► loader ──► attach in load order ──► registry
//!        │
//!        ▼ per frame
//! Host::tick(dt) ──► DispatcherScope ──► plugin updates ──► process()
//!        │
//!        ▼ on drop / shutdown
//! detach + unload in reverse load order
//! ```
//!
//! Rendering backends, windowing backends, and game systems are external
//! collaborators: they ship as plugins and talk over the bus.

pub mod host;

pub use host::Host;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::host::Host;
    pub use kiln_message::prelude::*;
    pub use kiln_plugin::prelude::*;
}
