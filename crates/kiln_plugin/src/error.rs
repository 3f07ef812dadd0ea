//! Error types for the plugin system

use std::path::PathBuf;

use thiserror::Error;

/// Result type for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;

/// Errors that can occur while loading or managing plugins
#[derive(Debug, Error)]
pub enum PluginError {
    /// Failed to load a native library
    #[error("Failed to load library '{path}': {message}")]
    Load { path: PathBuf, message: String },

    /// Library does not export a required symbol
    #[error("Symbol '{symbol}' not found in library '{library}'")]
    SymbolNotFound { library: String, symbol: String },

    /// A factory returned a null instance
    #[error("Plugin factory for entry point '{0}' returned null")]
    NullInstance(String),

    /// No statically registered plugin for an entry point
    #[error("No static plugin registered for entry point '{0}'")]
    EntryPointNotRegistered(String),

    /// Manifest is missing a required field
    #[error("Missing required manifest field: {0}")]
    MissingField(String),

    /// Manifest carries an unparseable version string
    #[error("Invalid version string '{0}'")]
    InvalidVersion(String),

    /// A declared dependency has no manifest
    #[error("Plugin '{plugin}' requires missing dependency '{dependency}'")]
    MissingDependency { plugin: String, dependency: String },

    /// The dependency graph contains a cycle
    #[error("Dependency cycle among plugins: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// Plugin not found
    #[error("Plugin '{0}' not found")]
    NotFound(String),

    /// Operation not valid in the plugin's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("Manifest parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl PluginError {
    /// Create a library load error
    pub fn load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        PluginError::Load {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a symbol not found error
    pub fn symbol_not_found(library: impl Into<String>, symbol: impl Into<String>) -> Self {
        PluginError::SymbolNotFound {
            library: library.into(),
            symbol: symbol.into(),
        }
    }

    /// Create a missing dependency error
    pub fn missing_dependency(plugin: impl Into<String>, dependency: impl Into<String>) -> Self {
        PluginError::MissingDependency {
            plugin: plugin.into(),
            dependency: dependency.into(),
        }
    }
}
