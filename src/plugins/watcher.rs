//! Dev-mode hot reload.
//!
//! While the project has dev mode on, the plugin directory is watched
//! recursively through a `notify` debouncer. Each debounced batch of
//! changes triggers one reload: every plugin is destroyed, the whole set is
//! loaded again from disk, and a `plugins-reloaded` event is raised.

use std::path::Path;
use std::sync::{Arc, PoisonError};

use futures::future::BoxFuture;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{DebounceEventResult, DebouncedEventKind, Debouncer, new_debouncer};
use tracing::Instrument;

use super::discovery::PluginDiscovery;
use super::events::PluginEvent;
use super::manager::PluginManager;
use super::{PluginError, Result};
use crate::observability::reload_span;

/// An active watch on the plugin directory. Dropping it stops the watch;
/// reloads already started run to completion.
pub(super) struct DevWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
}

/// Whether a changed path should trigger a reload. Paths that no longer
/// exist were removed, and dependency or staging folders never count.
fn is_plugin_path(path: &Path) -> bool {
    !PluginDiscovery::is_reserved(path) && std::fs::symlink_metadata(path).is_ok()
}

impl PluginManager {
    /// Starts or stops watching to match the project's dev-mode flag.
    /// Returns whether a watch is active afterwards.
    pub async fn init_dev_mode(&self) -> Result<bool> {
        if !self.inner.project.dev_mode() {
            self.stop_dev_mode();
            return Ok(false);
        }
        self.start_dev_mode().await?;
        Ok(self.is_watching())
    }

    /// Begins watching the plugin directory, creating it if needed.
    ///
    /// Does nothing when dev mode is off or a watch is already active.
    /// Returns whether a new watch was started.
    pub async fn start_dev_mode(&self) -> Result<bool> {
        if !self.inner.project.dev_mode() || self.is_watching() {
            return Ok(false);
        }

        let dir = self.inner.plugin_dir.clone();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PluginError::filesystem(&dir, e))?;

        let runtime = tokio::runtime::Handle::current();
        let inner = Arc::downgrade(&self.inner);
        let mut debouncer = new_debouncer(self.inner.debounce, move |res: DebounceEventResult| {
            let events = match res {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(error = %e, "Plugin watcher error");
                    return;
                }
            };

            let changed: Vec<_> = events
                .iter()
                .filter(|event| event.kind == DebouncedEventKind::Any && is_plugin_path(&event.path))
                .map(|event| event.path.display().to_string())
                .collect();
            if changed.is_empty() {
                return;
            }
            tracing::debug!(paths = ?changed, "Plugin files changed");

            if let Some(inner) = inner.upgrade() {
                let manager = PluginManager { inner };
                runtime.spawn(async move {
                    let _ = manager.reload().await;
                });
            }
        })?;
        debouncer.watcher().watch(&dir, RecursiveMode::Recursive)?;
        let started = DevWatcher {
            _debouncer: debouncer,
        };

        let mut slot = self
            .inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(started);
        tracing::info!(path = %dir.display(), "Watching plugins for changes");
        Ok(true)
    }

    /// Stops watching. Returns whether a watch was active.
    pub fn stop_dev_mode(&self) -> bool {
        let stopped = self
            .inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match stopped {
            Some(watcher) => {
                drop(watcher);
                tracing::info!(path = %self.inner.plugin_dir.display(), "Stopped watching plugins");
                true
            }
            None => false,
        }
    }

    /// Destroys every plugin, loads the set again and restarts watching.
    ///
    /// Reload cycles never overlap; a cycle requested while one runs waits
    /// for it. `plugins-reloaded` is raised whether or not loading
    /// succeeded.
    // Boxed because the watcher spawns reloads from `start_dev_mode`, which
    // a reload itself awaits.
    pub fn reload(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let _flight = self.inner.reload_lock.lock().await;
            self.reload_locked().instrument(reload_span()).await
        })
    }

    async fn reload_locked(&self) -> Result<usize> {
        self.destroy_plugins().await;
        let result = self.load_plugins().await;
        match &result {
            Ok(loaded) => {
                tracing::Span::current().record("plugins", *loaded as u64);
                tracing::info!(plugins = *loaded, "Reloaded plugins");
            }
            Err(e) => tracing::error!(error = %e, "Error reloading plugins"),
        }

        if let Err(e) = self.start_dev_mode().await {
            tracing::error!(error = %e, "Unable to restart plugin watcher");
        }
        self.inner.events.emit(PluginEvent::Reloaded);
        result
    }
}
