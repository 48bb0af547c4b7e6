use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{RwLock, broadcast};

use super::events::{DEFAULT_EVENT_CAPACITY, EventBus, PluginEvent};
use super::fetch::{PackageFetcher, TarballFetcher};
use super::resolver::{ModuleResolver, StaticResolver};
use super::store::DescriptorStore;
use super::watcher::DevWatcher;
use crate::project::ProjectContext;

/// Quiet period a changed plugin path must reach before dev mode reloads.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Loads, reloads, installs and dispatches hooks to board plugins.
///
/// Cloning is cheap; clones share the same plugin set.
#[derive(Clone)]
pub struct PluginManager {
    pub(super) inner: Arc<ManagerInner>,
}

pub(super) struct ManagerInner {
    pub(super) project: Arc<dyn ProjectContext>,
    pub(super) plugin_dir: PathBuf,
    pub(super) builtins: Vec<PathBuf>,
    pub(super) resolver: Arc<dyn ModuleResolver>,
    pub(super) fetcher: Arc<dyn PackageFetcher>,
    pub(super) store: RwLock<DescriptorStore>,
    pub(super) events: EventBus,
    pub(super) watcher: Mutex<Option<DevWatcher>>,
    /// Serializes reload cycles, install-time loads and uninstalls.
    pub(super) reload_lock: tokio::sync::Mutex<()>,
    pub(super) debounce: Duration,
}

pub struct PluginManagerBuilder {
    project: Arc<dyn ProjectContext>,
    plugin_dir: Option<PathBuf>,
    builtins: Vec<PathBuf>,
    resolver: Option<Arc<dyn ModuleResolver>>,
    fetcher: Option<Arc<dyn PackageFetcher>>,
    debounce: Duration,
    event_capacity: usize,
}

impl PluginManagerBuilder {
    fn new(project: Arc<dyn ProjectContext>) -> Self {
        Self {
            project,
            plugin_dir: None,
            builtins: Vec::new(),
            resolver: None,
            fetcher: None,
            debounce: DEFAULT_DEBOUNCE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Overrides `<project>/.imdone/plugins`.
    pub fn plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = Some(dir.into());
        self
    }

    /// Adds a built-in plugin location, loaded before user plugins.
    pub fn builtin(mut self, path: impl Into<PathBuf>) -> Self {
        self.builtins.push(path.into());
        self
    }

    pub fn builtins<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.builtins.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn resolver<R: ModuleResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn resolver_arc(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn fetcher<F: PackageFetcher + 'static>(mut self, fetcher: F) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    pub fn fetcher_arc(mut self, fetcher: Arc<dyn PackageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn debounce(mut self, delay: Duration) -> Self {
        self.debounce = delay;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Builds the manager. No plugins are loaded until
    /// [`PluginManager::load_plugins`] is called.
    pub fn build(self) -> PluginManager {
        let plugin_dir = self
            .plugin_dir
            .unwrap_or_else(|| self.project.plugin_dir());
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(StaticResolver::new()));
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(TarballFetcher::new()));

        tracing::debug!(
            plugin_dir = %plugin_dir.display(),
            builtins = self.builtins.len(),
            "Creating PluginManager"
        );

        PluginManager {
            inner: Arc::new(ManagerInner {
                project: self.project,
                plugin_dir,
                builtins: self.builtins,
                resolver,
                fetcher,
                store: RwLock::new(DescriptorStore::new()),
                events: EventBus::new(self.event_capacity),
                watcher: Mutex::new(None),
                reload_lock: tokio::sync::Mutex::new(()),
                debounce: self.debounce,
            }),
        }
    }
}

impl PluginManager {
    pub fn builder(project: Arc<dyn ProjectContext>) -> PluginManagerBuilder {
        PluginManagerBuilder::new(project)
    }

    /// Builds a manager, loads every plugin and starts dev mode when the
    /// project enables it.
    pub async fn start(builder: PluginManagerBuilder) -> super::Result<Self> {
        let manager = builder.build();
        manager.load_plugins().await?;
        manager.init_dev_mode().await?;
        Ok(manager)
    }

    pub fn project(&self) -> &Arc<dyn ProjectContext> {
        &self.inner.project
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.inner.plugin_dir
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.inner.events.subscribe()
    }

    pub async fn plugin_count(&self) -> usize {
        self.inner.store.read().await.len()
    }

    pub async fn has_plugin(&self, identity: &str) -> bool {
        self.inner.store.read().await.contains(identity)
    }

    /// Identities in registration (dispatch) order.
    pub async fn plugin_identities(&self) -> Vec<String> {
        self.inner
            .store
            .read()
            .await
            .identities()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Package name of the plugin registered under `identity`.
    pub async fn plugin_name_of(&self, identity: &str) -> Option<String> {
        self.inner
            .store
            .read()
            .await
            .get(identity)
            .map(|d| d.name().to_string())
    }

    /// Metadata of the plugin registered under `identity`.
    pub async fn plugin_info(&self, identity: &str) -> Option<super::PluginInfo> {
        self.inner
            .store
            .read()
            .await
            .get(identity)
            .map(|d| d.info().clone())
    }

    /// Configured settings for a plugin package, `{}` when absent.
    pub fn plugin_settings(&self, name: &str) -> Value {
        self.inner.project.plugin_settings(name)
    }

    pub fn is_watching(&self) -> bool {
        self.inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugin_dir", &self.inner.plugin_dir)
            .field("builtins", &self.inner.builtins)
            .field("debounce", &self.inner.debounce)
            .field("watching", &self.is_watching())
            .finish_non_exhaustive()
    }
}
