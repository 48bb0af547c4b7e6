use std::path::Component;
use std::path::Path;

use tracing::Instrument;

use super::discovery::RESERVED_DIR;
use super::events::PluginEvent;
use super::guard::teardown;
use super::manager::PluginManager;
use super::{PluginError, Result};
use crate::observability::install_span;

/// Rejects names that would not map to exactly one directory directly
/// under the plugin directory.
fn validate_install_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| PluginError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if name == RESERVED_DIR {
        return Err(invalid("name is reserved"));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(invalid("name must be a single directory name")),
    }
}

impl PluginManager {
    /// Fetches `version` into `<plugin_dir>/<name>` and loads it.
    ///
    /// `version` is anything the configured fetcher understands: an archive
    /// URL or a GitHub `owner/repo[#ref]` shorthand for the default
    /// fetcher. Fetch failures are returned. A fetched package that fails
    /// to load is logged, and `plugin-installed` is still raised.
    pub async fn install(&self, name: &str, version: &str) -> Result<()> {
        validate_install_name(name)?;
        self.install_package(name, version)
            .instrument(install_span(name, version))
            .await
    }

    async fn install_package(&self, name: &str, version: &str) -> Result<()> {
        let dir = &self.inner.plugin_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| PluginError::filesystem(dir, e))?;

        let install_path = dir.join(name);
        tracing::info!(name, version, path = %install_path.display(), "Installing plugin");
        self.inner.fetcher.fetch(version, &install_path).await?;
        tracing::info!(name, "Done installing");

        {
            let _flight = self.inner.reload_lock.lock().await;
            // Failures are logged by `load_plugin`.
            let _ = self.load_plugin(&install_path).await;
        }

        self.inner.events.emit(PluginEvent::Installed(name.to_string()));
        Ok(())
    }

    /// Removes the plugin whose package name is `name`: deletes its
    /// directory, destroys the instance and unregisters it.
    ///
    /// A directory already gone from disk is not an error.
    pub async fn uninstall(&self, name: &str) -> Result<()> {
        let _flight = self.inner.reload_lock.lock().await;
        tracing::info!(name, "Preparing to uninstall plugin");

        let (identity, path, version) = {
            let store = self.inner.store.read().await;
            let descriptor = store.find_by_name(name).ok_or_else(|| PluginError::NotFound {
                name: name.to_string(),
            })?;
            (
                descriptor.identity().to_string(),
                descriptor.info().path.clone(),
                descriptor.info().version.clone(),
            )
        };

        tracing::info!(
            name,
            version = version.as_deref().unwrap_or("unknown"),
            path = %path.display(),
            "Uninstalling plugin"
        );
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Plugin directory already removed");
            }
            Err(e) => return Err(PluginError::filesystem(path, e)),
        }

        let removed = self.inner.store.write().await.remove(&identity);
        if let Some(descriptor) = removed {
            teardown(&descriptor);
        }

        self.inner.events.emit(PluginEvent::Uninstalled(name.to_string()));
        Ok(())
    }
}
