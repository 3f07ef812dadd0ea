//! Dynamic library loading
//!
//! RAII wrapper over a native dynamic library handle: construction opens the
//! library, destruction closes it. Non-copyable, movable.

use std::fmt;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::error::{PluginError, Result};

/// A loaded native dynamic library (.so / .dll / .dylib).
pub struct SharedLibrary {
    library: Library,
    path: PathBuf,
}

impl SharedLibrary {
    /// Open a dynamic library.
    ///
    /// # Safety note
    /// Loading a library runs its initialization code; only load trusted
    /// plugin modules.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let library = unsafe {
            Library::new(path).map_err(|e| PluginError::load(path, e.to_string()))?
        };

        log::info!("Loaded shared library '{}'", path.display());

        Ok(Self {
            library,
            path: path.to_path_buf(),
        })
    }

    /// Check whether the library exports a symbol
    pub fn has_symbol(&self, name: &str) -> bool {
        unsafe { self.library.get::<*mut ()>(name.as_bytes()).is_ok() }
    }

    /// Resolve an exported symbol.
    ///
    /// Returns `None` if the symbol is absent.
    ///
    /// # Safety
    /// The caller must ensure `T` matches the symbol's actual type.
    pub unsafe fn get_symbol<T>(&self, name: &str) -> Option<Symbol<'_, T>> {
        self.library.get(name.as_bytes()).ok()
    }

    /// The path the library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The library's file stem, used in diagnostics
    pub fn name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("unknown")
    }
}

impl Drop for SharedLibrary {
    fn drop(&mut self) {
        log::debug!("Unloading shared library '{}'", self.path.display());
        // The handle is closed when the inner Library drops
    }
}

impl fmt::Debug for SharedLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedLibrary")
            .field("path", &self.path)
            .finish()
    }
}
