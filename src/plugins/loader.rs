use std::path::Path;

use tracing::Instrument;

use super::discovery::PluginDiscovery;
use super::guard::{call_guarded, teardown};
use super::manager::PluginManager;
use super::manifest::PluginInfo;
use super::resolver::ModuleExport;
use super::store::{PluginDescriptor, Registered};
use super::traits::{PluginContext, PluginSettings};
use super::{PluginError, Result};
use crate::observability::load_span;

impl PluginManager {
    /// Loads built-in plugins, then every candidate in the plugin directory.
    ///
    /// Individual load failures are logged and skipped. Only a failure to
    /// enumerate the plugin directory is returned. Yields the number of
    /// plugins that loaded.
    pub async fn load_plugins(&self) -> Result<usize> {
        let mut loaded = 0;

        for path in &self.inner.builtins {
            if self.load_plugin(path).await.is_ok() {
                loaded += 1;
            }
        }

        for path in PluginDiscovery::discover(&self.inner.plugin_dir).await? {
            if self.load_plugin(&path).await.is_ok() {
                loaded += 1;
            }
        }

        let total = self.plugin_count().await;
        tracing::debug!(loaded, total, "Plugins loaded");
        Ok(loaded)
    }

    /// Loads the plugin at `path` and registers it, returning its identity.
    ///
    /// The cached resolution for `path` is discarded first so the current
    /// on-disk code is used. Failures are logged before being returned.
    pub async fn load_plugin(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let span = load_span(path);
        let result = self.create_plugin(path).instrument(span.clone()).await;

        match &result {
            Ok(identity) => {
                span.record("identity", identity.as_str());
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Error loading plugin");
            }
        }
        result
    }

    async fn create_plugin(&self, path: &Path) -> Result<String> {
        tracing::info!(path = %path.display(), "Loading plugin");

        let resolver = self.inner.resolver.clone();
        let target = path.to_path_buf();
        let export = tokio::task::spawn_blocking(move || {
            resolver.evict(&target);
            call_guarded(|| resolver.resolve(&target))
        })
        .await
        .map_err(|e| PluginError::load_failure(path, e.to_string()))?
        .map_err(|e| match e {
            PluginError::LoadFailure { .. } => e,
            other => PluginError::load_failure(path, other.to_string()),
        })?;

        let class = match export {
            ModuleExport::Plugin(class) => class,
            ModuleExport::Foreign { type_name } => {
                return Err(PluginError::NotAPlugin {
                    type_name,
                    path: path.to_path_buf(),
                });
            }
        };

        let info = match PluginInfo::read(path).await {
            Ok(info) => info,
            Err(e) => {
                tracing::info!(path = %path.display(), reason = %e, "No info on plugin");
                PluginInfo::fallback(path)
            }
        };

        let project = self.inner.project.clone();
        let ctx = PluginContext {
            settings: PluginSettings::new(project.clone(), info.name.clone()),
            project,
        };
        let instance = call_guarded(|| class.instantiate(ctx))
            .map_err(|e| PluginError::load_failure(path, e.to_string()))?;

        let descriptor = PluginDescriptor::new(class, instance, info);
        let identity = descriptor.identity().to_string();

        let outcome = self.inner.store.write().await.register(descriptor);
        match outcome {
            Ok(Registered::New) => Ok(identity),
            Ok(Registered::Replaced(previous)) => {
                tracing::debug!(plugin = %identity, "Replaced previously loaded instance");
                teardown(&previous);
                Ok(identity)
            }
            Err((err, rejected)) => {
                teardown(&rejected);
                Err(err)
            }
        }
    }
}
