//! Manifest-driven plugin loading
//!
//! Scans a directory for manifests, resolves a deterministic load order over
//! the dependency graph, and materializes each plugin from its dynamic
//! library or from the static registration table. One plugin failing to load
//! never aborts the batch; the failure is recorded on its [`LoadedPlugin`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{PluginError, Result};
use crate::library::SharedLibrary;
use crate::manifest::{scan_manifests, PluginMeta};
use crate::plugin::{PluginCreateFn, PluginDestroyFn, PluginHost, PluginInstance};
use crate::registry::PluginHandle;
use crate::static_registry::static_factory;

/// Export the plugin ABI for a dynamic library.
///
/// For a manifest entry point `audio_mixer`, the loader resolves the symbols
/// `audio_mixer_create` and `audio_mixer_destroy`; spell them out as the
/// first two arguments:
///
/// ```ignore
/// kiln_plugin::export_plugin!(audio_mixer_create, audio_mixer_destroy, AudioMixer::new());
/// ```
///
/// The factory hands ownership of a heap-allocated instance across the
/// library boundary; the destroyer takes it back so the instance is freed by
/// the allocator that produced it.
#[macro_export]
macro_rules! export_plugin {
    ($create:ident, $destroy:ident, $ctor:expr) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn $create() -> *mut dyn $crate::Plugin {
            let plugin: Box<dyn $crate::Plugin> = Box::new($ctor);
            Box::into_raw(plugin)
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn $destroy(plugin: *mut dyn $crate::Plugin) {
            if !plugin.is_null() {
                drop(Box::from_raw(plugin));
            }
        }
    };
}

/// A plugin materialized by [`load_plugins`].
///
/// Owns the instance and, for dynamic plugins, the library it came from. A
/// failed load keeps the manifest and the error with no instance. Dropping a
/// `LoadedPlugin` destroys the instance through the originating library's
/// destroyer before the library handle is released.
pub struct LoadedPlugin {
    meta: PluginMeta,
    instance: Option<PluginHandle>,
    library: Option<Arc<SharedLibrary>>,
    error: Option<PluginError>,
}

impl LoadedPlugin {
    fn loaded(meta: PluginMeta, instance: PluginHandle, library: Option<Arc<SharedLibrary>>) -> Self {
        Self {
            meta,
            instance: Some(instance),
            library,
            error: None,
        }
    }

    fn failed(meta: PluginMeta, error: PluginError) -> Self {
        log::error!("Plugin '{}' failed to load: {}", meta.id, error);
        Self {
            meta,
            instance: None,
            library: None,
            error: Some(error),
        }
    }

    /// The manifest this plugin was loaded from
    pub fn meta(&self) -> &PluginMeta {
        &self.meta
    }

    /// Check whether an instance was materialized
    pub fn is_loaded(&self) -> bool {
        self.instance.is_some()
    }

    /// The live instance, if the load succeeded
    pub fn instance(&self) -> Option<&PluginHandle> {
        self.instance.as_ref()
    }

    /// The backing library, for dynamically loaded plugins
    pub fn library(&self) -> Option<&Arc<SharedLibrary>> {
        self.library.as_ref()
    }

    /// The load error, if the load failed
    pub fn error(&self) -> Option<&PluginError> {
        self.error.as_ref()
    }

    /// Attach the instance and register it with the host's registry.
    ///
    /// Registers under the plugin's runtime name and, when different, the
    /// manifest id. No-op for failed loads.
    pub fn attach(&self, host: &PluginHost) {
        let Some(instance) = &self.instance else {
            return;
        };
        let name = {
            let mut guard = instance.lock();
            guard.attach(host);
            guard.name().to_string()
        };
        host.registry().register_plugin(&name, instance);
        if !name.eq_ignore_ascii_case(&self.meta.id) {
            host.registry().register_plugin(&self.meta.id, instance);
        }
    }

    /// Detach the instance and unregister it. No-op for failed loads.
    pub fn detach(&self, host: &PluginHost) {
        let Some(instance) = &self.instance else {
            return;
        };
        {
            let mut guard = instance.lock();
            if guard.is_attached() {
                guard.detach();
            }
        }
        host.registry().unregister_instance(instance);
    }

    /// Swap the instance for a freshly loaded one from the current module on
    /// disk, carrying plugin state across via snapshot/restore.
    ///
    /// The old instance is destroyed through the old library before the new
    /// library is opened. The caller re-attaches afterwards.
    #[cfg(feature = "hot-reload")]
    pub fn reload(&mut self, host: &PluginHost) -> Result<()> {
        let path = match &self.meta.module_path {
            Some(path) => path.clone(),
            None => {
                return Err(PluginError::InvalidState(format!(
                    "plugin '{}' is statically linked",
                    self.meta.id
                )))
            }
        };

        let mut state = Vec::new();
        if let Some(instance) = self.instance.take() {
            {
                let mut guard = instance.lock();
                state = guard.snapshot();
                if guard.is_attached() {
                    guard.detach();
                }
            }
            host.registry().unregister_instance(&instance);
        }
        self.library = None;

        match instantiate_dynamic(&self.meta, &path) {
            Ok((instance, library)) => {
                instance.lock().restore(&state);
                self.instance = Some(instance);
                self.library = Some(library);
                self.error = None;
                log::info!("Reloaded plugin '{}' from '{}'", self.meta.id, path.display());
                Ok(())
            }
            Err(e) => {
                log::error!("Reload of plugin '{}' failed: {}", self.meta.id, e);
                self.error = Some(PluginError::load(&path, e.to_string()));
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("id", &self.meta.id)
            .field("loaded", &self.is_loaded())
            .field("dynamic", &self.library.is_some())
            .finish()
    }
}

/// Load plugins from the manifests under `directory`.
///
/// With an empty `requested_ids` every discovered manifest is loaded;
/// otherwise the requested set plus its transitive dependency closure.
/// Plugins come back in load order: dependencies first, ties broken by
/// ascending priority then id. The caller attaches in order, retains the
/// vector for the application's lifetime, and tears down in reverse.
///
/// A dependency cycle is fatal. Individual load failures are not: the
/// affected plugin comes back with [`LoadedPlugin::error`] set and no
/// instance. A requested id with no manifest is logged and absent from the
/// result; callers that require it should check.
pub fn load_plugins(directory: &Path, requested_ids: &[String]) -> Result<Vec<LoadedPlugin>> {
    let metas = scan_manifests(directory)?;

    let mut by_id: BTreeMap<String, PluginMeta> = BTreeMap::new();
    for meta in metas {
        if let Some(duplicate) = by_id.insert(meta.id.clone(), meta) {
            log::warn!("Duplicate manifest for plugin '{}'; keeping the last", duplicate.id);
        }
    }

    // Requested set plus transitive dependency closure
    let mut selected: BTreeSet<String> = BTreeSet::new();
    let mut frontier: Vec<String> = if requested_ids.is_empty() {
        by_id.keys().cloned().collect()
    } else {
        requested_ids.to_vec()
    };
    while let Some(id) = frontier.pop() {
        if !selected.insert(id.clone()) {
            continue;
        }
        if let Some(meta) = by_id.get(&id) {
            frontier.extend(meta.dependencies.iter().cloned());
        }
    }

    let mut failures: Vec<LoadedPlugin> = Vec::new();
    let mut loadable: Vec<PluginMeta> = Vec::new();
    for id in &selected {
        match by_id.get(id) {
            Some(meta) => {
                match meta.dependencies.iter().find(|dep| !by_id.contains_key(*dep)) {
                    Some(missing) => failures.push(LoadedPlugin::failed(
                        meta.clone(),
                        PluginError::missing_dependency(&meta.id, missing),
                    )),
                    None => loadable.push(meta.clone()),
                }
            }
            None => {
                log::warn!(
                    "Requested plugin '{}' has no manifest under '{}'",
                    id,
                    directory.display()
                );
            }
        }
    }

    let ordered = resolve_load_order(loadable)?;

    let mut plugins = Vec::with_capacity(ordered.len() + failures.len());
    for meta in ordered {
        match instantiate(&meta) {
            Ok((instance, library)) => {
                log::info!(
                    "Loaded plugin '{}' v{} ({})",
                    meta.id,
                    meta.version,
                    if library.is_some() { "dynamic" } else { "static" }
                );
                plugins.push(LoadedPlugin::loaded(meta, instance, library));
            }
            Err(e) => plugins.push(LoadedPlugin::failed(meta, e)),
        }
    }
    plugins.extend(failures);

    Ok(plugins)
}

/// Deterministic topological order: dependencies first, ties broken by
/// ascending priority then id.
fn resolve_load_order(metas: Vec<PluginMeta>) -> Result<Vec<PluginMeta>> {
    let index_of: BTreeMap<&str, usize> = metas
        .iter()
        .enumerate()
        .map(|(index, meta)| (meta.id.as_str(), index))
        .collect();

    let mut indegree = vec![0usize; metas.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); metas.len()];
    for (index, meta) in metas.iter().enumerate() {
        for dep in &meta.dependencies {
            // Deps outside the batch were already reported as failures
            if let Some(&dep_index) = index_of.get(dep.as_str()) {
                indegree[index] += 1;
                dependents[dep_index].push(index);
            }
        }
    }

    let mut ready: Vec<usize> = (0..metas.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order: Vec<usize> = Vec::with_capacity(metas.len());
    while !ready.is_empty() {
        ready.sort_by(|&a, &b| {
            (metas[a].priority, &metas[a].id).cmp(&(metas[b].priority, &metas[b].id))
        });
        let next = ready.remove(0);
        order.push(next);
        for &dependent in &dependents[next] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.push(dependent);
            }
        }
    }

    if order.len() != metas.len() {
        let mut stuck: Vec<String> = metas
            .iter()
            .enumerate()
            .filter(|(index, _)| !order.contains(index))
            .map(|(_, meta)| meta.id.clone())
            .collect();
        stuck.sort();
        return Err(PluginError::DependencyCycle(stuck));
    }

    // Reorder without cloning each meta
    let mut slots: Vec<Option<PluginMeta>> = metas.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .map(|index| slots[index].take().expect("load order visits each plugin once"))
        .collect())
}

fn instantiate(meta: &PluginMeta) -> Result<(PluginHandle, Option<Arc<SharedLibrary>>)> {
    match &meta.module_path {
        Some(path) => {
            let (instance, library) = instantiate_dynamic(meta, path)?;
            Ok((instance, Some(library)))
        }
        None => {
            let factory = static_factory(&meta.entry_point)
                .ok_or_else(|| PluginError::EntryPointNotRegistered(meta.entry_point.clone()))?;
            let instance = PluginInstance::from_plugin(factory());
            Ok((Arc::new(Mutex::new(instance)), None))
        }
    }
}

fn instantiate_dynamic(
    meta: &PluginMeta,
    path: &Path,
) -> Result<(PluginHandle, Arc<SharedLibrary>)> {
    let library = Arc::new(SharedLibrary::load(path)?);

    let create_symbol = format!("{}_create", meta.entry_point);
    let destroy_symbol = format!("{}_destroy", meta.entry_point);

    let create: PluginCreateFn = unsafe { library.get_symbol::<PluginCreateFn>(&create_symbol) }
        .map(|symbol| *symbol)
        .ok_or_else(|| PluginError::symbol_not_found(library.name(), &create_symbol))?;
    let destroy: PluginDestroyFn = unsafe { library.get_symbol::<PluginDestroyFn>(&destroy_symbol) }
        .map(|symbol| *symbol)
        .ok_or_else(|| PluginError::symbol_not_found(library.name(), &destroy_symbol))?;

    let raw = unsafe { create() };
    if raw.is_null() {
        return Err(PluginError::NullInstance(meta.entry_point.clone()));
    }

    let instance = unsafe { PluginInstance::from_raw(raw, destroy, library.clone()) };
    Ok((Arc::new(Mutex::new(instance)), library))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, deps: &[&str], priority: i32) -> PluginMeta {
        PluginMeta {
            id: id.to_string(),
            name: id.to_string(),
            version: crate::version::Version::ZERO,
            entry_point: id.replace('-', "_"),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            module_path: None,
            priority,
        }
    }

    fn order_of(metas: Vec<PluginMeta>) -> Vec<String> {
        resolve_load_order(metas)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect()
    }

    #[test]
    fn test_dependencies_load_first() {
        let order = order_of(vec![
            meta("windowing", &["core"], 0),
            meta("renderer", &["windowing", "core"], 0),
            meta("core", &[], 0),
        ]);
        assert_eq!(order, vec!["core", "windowing", "renderer"]);
    }

    #[test]
    fn test_ties_break_by_priority_then_id() {
        let order = order_of(vec![
            meta("zeta", &[], 0),
            meta("alpha", &[], 5),
            meta("beta", &[], 0),
        ]);
        assert_eq!(order, vec!["beta", "zeta", "alpha"]);
    }

    #[test]
    fn test_cycle_is_fatal() {
        let result = resolve_load_order(vec![
            meta("a", &["b"], 0),
            meta("b", &["c"], 0),
            meta("c", &["a"], 0),
            meta("standalone", &[], 0),
        ]);
        match result {
            Err(PluginError::DependencyCycle(ids)) => {
                assert_eq!(ids, vec!["a", "b", "c"]);
            }
            other => panic!("expected a dependency cycle, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_order_is_deterministic() {
        let build = || {
            vec![
                meta("physics", &["math"], 0),
                meta("math", &[], 0),
                meta("audio", &[], 0),
                meta("input", &[], 0),
            ]
        };
        assert_eq!(order_of(build()), order_of(build()));
        assert_eq!(order_of(build()), vec!["audio", "input", "math", "physics"]);
    }
}
