//! Resolution of on-disk plugin locations to plugin classes.
//!
//! The loader only sees [`ModuleResolver`]; how a path turns into code is
//! up to the backend. [`StaticResolver`] maps locations to classes compiled
//! into the host. The `dylib` feature adds a shared-library backend.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::PluginError;
use super::manifest::package_main;
use super::traits::{NativeClass, PluginClass, PluginFactory};

/// What a module at a path exports.
#[derive(Clone)]
pub enum ModuleExport {
    /// A class registered through the plugin capability interface.
    Plugin(Arc<dyn PluginClass>),
    /// Anything else the module exposes; never instantiated.
    Foreign { type_name: String },
}

impl ModuleExport {
    pub fn type_name(&self) -> &str {
        match self {
            ModuleExport::Plugin(class) => class.type_name(),
            ModuleExport::Foreign { type_name } => type_name,
        }
    }

    pub fn is_plugin(&self) -> bool {
        matches!(self, ModuleExport::Plugin(_))
    }
}

impl fmt::Debug for ModuleExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleExport::Plugin(class) => f.debug_tuple("Plugin").field(&class.type_name()).finish(),
            ModuleExport::Foreign { type_name } => {
                f.debug_struct("Foreign").field("type_name", type_name).finish()
            }
        }
    }
}

/// Maps a plugin directory to the code behind it.
///
/// The manager calls both methods on tokio's blocking pool, so
/// implementations may read files or load libraries synchronously.
pub trait ModuleResolver: Send + Sync {
    /// Resolves the module at `path`.
    fn resolve(&self, path: &Path) -> Result<ModuleExport, PluginError>;

    /// Drops any cached resolution of `path` so the next `resolve` observes
    /// the current on-disk state.
    fn evict(&self, path: &Path);
}

/// Resolver over classes compiled into the host.
///
/// A path resolves, in order, by exact path registration, by the `main`
/// entry of its `package.json`, then by its directory name.
#[derive(Default)]
pub struct StaticResolver {
    entries: HashMap<String, ModuleExport>,
    paths: HashMap<PathBuf, ModuleExport>,
    cache: Mutex<HashMap<PathBuf, ModuleExport>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a [`PluginFactory`] type under an entry name.
    pub fn register<P: PluginFactory>(self, entry: impl Into<String>) -> Self {
        self.register_class(entry, Arc::new(NativeClass::<P>::new()))
    }

    pub fn register_class(mut self, entry: impl Into<String>, class: Arc<dyn PluginClass>) -> Self {
        self.entries.insert(entry.into(), ModuleExport::Plugin(class));
        self
    }

    /// Binds a class to one exact location, as used for built-in plugins.
    pub fn register_path(mut self, path: impl Into<PathBuf>, class: Arc<dyn PluginClass>) -> Self {
        self.paths.insert(path.into(), ModuleExport::Plugin(class));
        self
    }

    /// Registers an entry that exports something other than a plugin.
    pub fn register_foreign(mut self, entry: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.entries.insert(
            entry.into(),
            ModuleExport::Foreign {
                type_name: type_name.into(),
            },
        );
        self
    }

    pub fn entry_names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    fn lookup(&self, path: &Path) -> Option<ModuleExport> {
        if let Some(export) = self.paths.get(path) {
            return Some(export.clone());
        }
        if let Some(main) = package_main(path)
            && let Some(export) = self.entries.get(&main)
        {
            return Some(export.clone());
        }
        let dir_name = path.file_name()?.to_str()?;
        self.entries.get(dir_name).cloned()
    }
}

impl ModuleResolver for StaticResolver {
    fn resolve(&self, path: &Path) -> Result<ModuleExport, PluginError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(export) = cache.get(path) {
            return Ok(export.clone());
        }
        let export = self.lookup(path).ok_or_else(|| {
            PluginError::load_failure(path, "no registered plugin module for this location")
        })?;
        cache.insert(path.to_path_buf(), export.clone());
        Ok(export)
    }

    fn evict(&self, path: &Path) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }
}

impl fmt::Debug for StaticResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticResolver")
            .field("entries", &self.entry_names())
            .field("paths", &self.paths.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::traits::{FnPluginClass, Plugin, PluginContext};
    use tempfile::tempdir;

    struct Cards;

    impl Plugin for Cards {}

    impl PluginFactory for Cards {
        fn create(_ctx: PluginContext) -> Result<Self, PluginError> {
            Ok(Cards)
        }
    }

    #[test]
    fn test_resolve_by_directory_name() {
        let resolver = StaticResolver::new().register::<Cards>("cards");
        let export = resolver.resolve(Path::new("/plugins/cards")).unwrap();
        assert!(export.is_plugin());
        assert_eq!(export.type_name(), "Cards");
    }

    #[test]
    fn test_resolve_by_package_main() {
        let dir = tempdir().unwrap();
        let plugin_dir = dir.path().join("renamed-dir");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(
            plugin_dir.join("package.json"),
            r#"{"name":"cards","main":"cards-entry"}"#,
        )
        .unwrap();

        let resolver = StaticResolver::new().register::<Cards>("cards-entry");
        assert_eq!(resolver.resolve(&plugin_dir).unwrap().type_name(), "Cards");
    }

    #[test]
    fn test_exact_path_wins() {
        let class = Arc::new(FnPluginClass::new("Builtin", |_| Ok(Box::new(Cards))));
        let resolver = StaticResolver::new()
            .register::<Cards>("epic")
            .register_path("builtin/epic", class);
        assert_eq!(
            resolver.resolve(Path::new("builtin/epic")).unwrap().type_name(),
            "Builtin"
        );
    }

    #[test]
    fn test_foreign_and_unknown() {
        let resolver = StaticResolver::new().register_foreign("helpers", "HelperUtils");
        let export = resolver.resolve(Path::new("/plugins/helpers")).unwrap();
        assert!(!export.is_plugin());
        assert_eq!(export.type_name(), "HelperUtils");

        let err = resolver.resolve(Path::new("/plugins/unknown")).unwrap_err();
        assert!(matches!(err, PluginError::LoadFailure { .. }));
    }

    #[test]
    fn test_cache_and_evict() {
        let dir = tempdir().unwrap();
        let plugin_dir = dir.path().join("p");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("package.json"), r#"{"main":"first"}"#).unwrap();

        let resolver = StaticResolver::new()
            .register_foreign("first", "First")
            .register_foreign("second", "Second");
        assert_eq!(resolver.resolve(&plugin_dir).unwrap().type_name(), "First");

        std::fs::write(plugin_dir.join("package.json"), r#"{"main":"second"}"#).unwrap();
        assert_eq!(resolver.resolve(&plugin_dir).unwrap().type_name(), "First");

        resolver.evict(&plugin_dir);
        assert_eq!(resolver.resolve(&plugin_dir).unwrap().type_name(), "Second");
    }
}
