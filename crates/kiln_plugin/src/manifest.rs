//! Manifest parser - TOML to PluginMeta conversion
//!
//! Each plugin ships a `plugin.toml` describing its identity, entry point,
//! dependencies, and (for dynamic plugins) the library to load.
//!
//! # Manifest Format
//!
//! ```toml
//! [plugin]
//! id = "audio-mixer"
//! name = "Audio Mixer"
//! version = "0.1.0"
//! entry_point = "audio_mixer"
//! priority = 10
//! dependencies = ["core-log"]
//! module = "libaudio_mixer.so"   # omit for statically linked plugins
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PluginError, Result};
use crate::version::Version;

/// Manifest file name searched for by [`scan_manifests`].
pub const MANIFEST_FILE_NAME: &str = "plugin.toml";

/// Manifest-derived plugin record.
#[derive(Debug, Clone)]
pub struct PluginMeta {
    /// Unique plugin identifier
    pub id: String,
    /// Human-readable name (defaults to the id)
    pub name: String,
    /// Plugin version
    pub version: Version,
    /// Entry-point identifier; derives the exported symbol names
    pub entry_point: String,
    /// Ids of plugins that must load before this one
    pub dependencies: Vec<String>,
    /// Library to load; `None` for plugins compiled into the host
    pub module_path: Option<PathBuf>,
    /// Load-order hint among plugins with no dependency relation (lower first)
    pub priority: i32,
}

impl PluginMeta {
    /// Check whether this plugin is statically linked into the host
    pub fn is_static(&self) -> bool {
        self.module_path.is_none()
    }
}

/// Raw TOML structure for the plugin section
#[derive(Debug, Deserialize)]
struct PluginToml {
    id: String,
    name: Option<String>,
    version: String,
    entry_point: String,
    #[serde(default)]
    dependencies: Vec<String>,
    module: Option<PathBuf>,
    #[serde(default)]
    priority: i32,
}

/// Root TOML structure
#[derive(Debug, Deserialize)]
struct ManifestToml {
    plugin: PluginToml,
}

/// Parse a manifest from a TOML string
pub fn parse_manifest(content: &str) -> Result<PluginMeta> {
    let raw: ManifestToml = toml::from_str(content)?;
    let plugin = raw.plugin;

    if plugin.id.is_empty() {
        return Err(PluginError::MissingField("id".into()));
    }
    if plugin.entry_point.is_empty() {
        return Err(PluginError::MissingField("entry_point".into()));
    }

    let version = Version::parse(&plugin.version)
        .ok_or_else(|| PluginError::InvalidVersion(plugin.version.clone()))?;

    Ok(PluginMeta {
        name: plugin.name.unwrap_or_else(|| plugin.id.clone()),
        id: plugin.id,
        version,
        entry_point: plugin.entry_point,
        dependencies: plugin.dependencies,
        module_path: plugin.module,
        priority: plugin.priority,
    })
}

/// Load and parse a manifest file.
///
/// A relative `module` path is resolved against the manifest's directory.
pub fn load_manifest(path: &Path) -> Result<PluginMeta> {
    let content = fs::read_to_string(path)?;
    let mut meta = parse_manifest(&content)?;

    if let Some(module) = &meta.module_path {
        if module.is_relative() {
            if let Some(parent) = path.parent() {
                meta.module_path = Some(parent.join(module));
            }
        }
    }

    Ok(meta)
}

/// Recursively scan a directory for `plugin.toml` manifests.
///
/// Unparseable manifests are logged and skipped; they carry no usable id to
/// report against. An unreadable root directory is an error.
pub fn scan_manifests(directory: &Path) -> Result<Vec<PluginMeta>> {
    let mut metas = Vec::new();
    scan_into(directory, &mut metas)?;
    // Deterministic scan result regardless of directory iteration order
    metas.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(metas)
}

fn scan_into(directory: &Path, metas: &mut Vec<PluginMeta>) -> Result<()> {
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            scan_into(&path, metas)?;
        } else if path.file_name().is_some_and(|name| name == MANIFEST_FILE_NAME) {
            match load_manifest(&path) {
                Ok(meta) => metas.push(meta),
                Err(e) => {
                    log::error!("Skipping bad manifest '{}': {}", path.display(), e);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [plugin]
        id = "audio-mixer"
        name = "Audio Mixer"
        version = "1.2.3"
        entry_point = "audio_mixer"
        priority = 10
        dependencies = ["core-log"]
        module = "libaudio_mixer.so"
    "#;

    #[test]
    fn test_parse_full_manifest() {
        let meta = parse_manifest(FULL).unwrap();
        assert_eq!(meta.id, "audio-mixer");
        assert_eq!(meta.name, "Audio Mixer");
        assert_eq!(meta.version, Version::new(1, 2, 3));
        assert_eq!(meta.entry_point, "audio_mixer");
        assert_eq!(meta.dependencies, vec!["core-log".to_string()]);
        assert_eq!(meta.priority, 10);
        assert!(!meta.is_static());
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let meta = parse_manifest(
            r#"
            [plugin]
            id = "core-log"
            version = "0.1.0"
            entry_point = "core_log"
        "#,
        )
        .unwrap();

        assert_eq!(meta.name, "core-log");
        assert!(meta.dependencies.is_empty());
        assert_eq!(meta.priority, 0);
        assert!(meta.is_static());
    }

    #[test]
    fn test_missing_required_field_is_an_error() {
        let result = parse_manifest(
            r#"
            [plugin]
            id = "broken"
            version = "0.1.0"
        "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_version_is_an_error() {
        let result = parse_manifest(
            r#"
            [plugin]
            id = "broken"
            version = "latest"
            entry_point = "broken"
        "#,
        );
        assert!(matches!(result, Err(PluginError::InvalidVersion(_))));
    }

    #[test]
    fn test_scan_finds_nested_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("audio/mixer");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join(MANIFEST_FILE_NAME), FULL).unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILE_NAME),
            r#"
            [plugin]
            id = "core-log"
            version = "0.1.0"
            entry_point = "core_log"
        "#,
        )
        .unwrap();
        fs::write(dir.path().join("readme.toml"), "ignored = true").unwrap();

        let metas = scan_manifests(dir.path()).unwrap();
        let ids: Vec<_> = metas.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["audio-mixer", "core-log"]);
    }

    #[test]
    fn test_relative_module_resolved_against_manifest_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE_NAME), FULL).unwrap();

        let meta = load_manifest(&dir.path().join(MANIFEST_FILE_NAME)).unwrap();
        assert_eq!(
            meta.module_path.unwrap(),
            dir.path().join("libaudio_mixer.so")
        );
    }
}
