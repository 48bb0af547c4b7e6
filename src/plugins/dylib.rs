//! Shared-library plugin backend.
//!
//! A plugin directory holds a `cdylib` built with
//! [`declare_plugin!`](crate::declare_plugin). The library file is the
//! `package.json` `main` entry when present, otherwise the platform library
//! name derived from the directory name (`libepics.so` for `epics/` on
//! Linux).
//!
//! Libraries are copied to a unique scratch file before loading so a
//! rebuilt library is picked up on reload even though the loader caches by
//! file name. Evicted libraries are retired, never unloaded: instances and
//! vtables handed out earlier may still point into them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use libloading::{Library, Symbol};

use super::PluginError;
use super::abi::{API_VERSION_SYMBOL, CLASS_SYMBOL, ClassConstructor, PLUGIN_API_VERSION};
use super::guard::call_guarded;
use super::manifest::package_main;
use super::resolver::{ModuleExport, ModuleResolver};

struct LoadedModule {
    export: ModuleExport,
    // Must outlive `export`.
    _library: Library,
}

pub struct DylibResolver {
    scratch_dir: PathBuf,
    loaded: Mutex<HashMap<PathBuf, LoadedModule>>,
    retired: Mutex<Vec<LoadedModule>>,
    counter: AtomicU64,
}

impl Default for DylibResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DylibResolver {
    pub fn new() -> Self {
        Self::with_scratch_dir(std::env::temp_dir().join("imdone-plugins"))
    }

    pub fn with_scratch_dir(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            loaded: Mutex::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Library file backing the plugin directory at `path`.
    pub fn library_path(path: &Path) -> Option<PathBuf> {
        if let Some(main) = package_main(path) {
            return Some(path.join(main));
        }
        let dir_name = path.file_name()?;
        Some(path.join(libloading::library_filename(dir_name)))
    }

    fn scratch_copy(&self, library: &Path) -> Result<PathBuf, PluginError> {
        std::fs::create_dir_all(&self.scratch_dir)
            .map_err(|e| PluginError::filesystem(&self.scratch_dir, e))?;
        let file_name = library
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "plugin".to_string());
        let copy = self.scratch_dir.join(format!(
            "{}-{}-{}",
            std::process::id(),
            self.counter.fetch_add(1, Ordering::Relaxed),
            file_name
        ));
        std::fs::copy(library, &copy).map_err(|e| PluginError::filesystem(library, e))?;
        Ok(copy)
    }

    fn open(&self, path: &Path) -> Result<LoadedModule, PluginError> {
        let library_path = Self::library_path(path)
            .ok_or_else(|| PluginError::load_failure(path, "cannot derive library name"))?;
        if !library_path.is_file() {
            return Err(PluginError::load_failure(
                path,
                format!("library {} not found", library_path.display()),
            ));
        }

        let copy = self.scratch_copy(&library_path)?;
        // SAFETY: loading runs the library's initializers. Plugin libraries
        // are trusted code installed into the project by the user.
        let library = unsafe { Library::new(&copy) }
            .map_err(|e| PluginError::load_failure(path, e.to_string()));
        #[cfg(unix)]
        let _ = std::fs::remove_file(&copy);
        let library = library?;

        let type_name = library_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // SAFETY: the symbol, when present, is the `u32` static emitted by
        // `declare_plugin!`.
        let version = unsafe { library.get::<*const u32>(API_VERSION_SYMBOL) }
            .ok()
            .map(|symbol: Symbol<*const u32>| unsafe { **symbol });
        let Some(version) = version else {
            return Ok(LoadedModule {
                export: ModuleExport::Foreign { type_name },
                _library: library,
            });
        };
        if version != PLUGIN_API_VERSION {
            return Err(PluginError::load_failure(
                path,
                format!("plugin API version {version}, host expects {PLUGIN_API_VERSION}"),
            ));
        }

        // SAFETY: the API version matched, so the symbol has the
        // `ClassConstructor` signature.
        let constructor: ClassConstructor = unsafe { library.get::<ClassConstructor>(CLASS_SYMBOL) }
            .map(|symbol| *symbol)
            .map_err(|e| PluginError::load_failure(path, e.to_string()))?;
        let class = call_guarded(|| Ok(constructor()))?;

        Ok(LoadedModule {
            export: ModuleExport::Plugin(class),
            _library: library,
        })
    }
}

impl ModuleResolver for DylibResolver {
    fn resolve(&self, path: &Path) -> Result<ModuleExport, PluginError> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(module) = loaded.get(path) {
            return Ok(module.export.clone());
        }
        let module = self.open(path)?;
        let export = module.export.clone();
        loaded.insert(path.to_path_buf(), module);
        tracing::debug!(path = %path.display(), export = ?export, "Loaded plugin library");
        Ok(export)
    }

    fn evict(&self, path: &Path) {
        let evicted = self
            .loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        if let Some(module) = evicted {
            self.retired
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(module);
        }
    }
}

impl std::fmt::Debug for DylibResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DylibResolver")
            .field("scratch_dir", &self.scratch_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_library_path_from_dir_name() {
        let path = DylibResolver::library_path(Path::new("/plugins/epics")).unwrap();
        assert_eq!(path, Path::new("/plugins/epics").join(libloading::library_filename("epics")));
    }

    #[test]
    fn test_library_path_from_main() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), r#"{"main":"build/links.so"}"#).unwrap();
        assert_eq!(
            DylibResolver::library_path(dir.path()).unwrap(),
            dir.path().join("build/links.so")
        );
    }

    #[test]
    fn test_missing_library() {
        let dir = tempdir().unwrap();
        let resolver = DylibResolver::with_scratch_dir(dir.path().join("scratch"));
        let err = resolver.resolve(&dir.path().join("epics")).unwrap_err();
        assert!(matches!(err, PluginError::LoadFailure { .. }));
    }

    #[test]
    fn test_invalid_library() {
        let dir = tempdir().unwrap();
        let plugin = dir.path().join("broken");
        std::fs::create_dir_all(&plugin).unwrap();
        std::fs::write(
            plugin.join(libloading::library_filename("broken")),
            b"not a shared object",
        )
        .unwrap();

        let resolver = DylibResolver::with_scratch_dir(dir.path().join("scratch"));
        let err = resolver.resolve(&plugin).unwrap_err();
        assert!(matches!(err, PluginError::LoadFailure { .. }));
        resolver.evict(&plugin);
    }
}
