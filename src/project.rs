//! Host project boundary seen by the plugin runtime.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde_json::Value;

use crate::config::{CONFIG_DIR, ConfigResult, ProjectConfig};

/// Directory under [`CONFIG_DIR`] holding user plugins.
pub const PLUGINS_DIR: &str = "plugins";

/// What plugins and the manager may ask of the host project.
pub trait ProjectContext: Send + Sync {
    /// Project root directory.
    fn path(&self) -> &Path;

    fn dev_mode(&self) -> bool;

    /// Persisted settings for the plugin with the given package name.
    fn plugin_settings(&self, name: &str) -> Value;

    fn plugin_dir(&self) -> PathBuf {
        self.path().join(CONFIG_DIR).join(PLUGINS_DIR)
    }
}

impl fmt::Debug for dyn ProjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectContext")
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}

/// File-backed project context.
#[derive(Debug)]
pub struct Project {
    path: PathBuf,
    config: RwLock<ProjectConfig>,
}

impl Project {
    pub fn new(path: impl Into<PathBuf>, config: ProjectConfig) -> Self {
        Self {
            path: path.into(),
            config: RwLock::new(config),
        }
    }

    /// Opens a project, reading `.imdone/config.yml` when present.
    pub async fn open(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        let config = ProjectConfig::load(&path).await?;
        Ok(Self::new(path, config))
    }

    pub fn config(&self) -> ProjectConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_config(&self, config: ProjectConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Re-reads the config file, keeping the previous config on error.
    pub async fn reload_config(&self) -> ConfigResult<()> {
        let config = ProjectConfig::load(&self.path).await?;
        self.set_config(config);
        Ok(())
    }
}

impl ProjectContext for Project {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dev_mode(&self) -> bool {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .dev_mode
    }

    fn plugin_settings(&self, name: &str) -> Value {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .plugin_settings(name)
    }
}
