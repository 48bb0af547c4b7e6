use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("{type_name} at {path} is not a plugin")]
    NotAPlugin { type_name: String, path: PathBuf },

    #[error("Unable to find plugin: {name}")]
    NotFound { name: String },

    #[error("Failed to load plugin at {path}: {message}")]
    LoadFailure { path: PathBuf, message: String },

    #[error("No package metadata for plugin at {path}")]
    MetadataMissing { path: PathBuf },

    #[error("Filesystem operation failed on {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch package '{version}': {message}")]
    Fetch { version: String, message: String },

    #[error("Duplicate plugin identity '{identity}': loaded from {existing}, rejected {rejected}")]
    DuplicateIdentity {
        identity: String,
        existing: PathBuf,
        rejected: PathBuf,
    },

    #[error("Invalid plugin name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("{0}")]
    Hook(String),

    #[error("Plugin panicked: {0}")]
    Panicked(String),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PluginError {
    /// Error raised from plugin code inside a hook or action callback.
    pub fn hook(message: impl Into<String>) -> Self {
        PluginError::Hook(message.into())
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PluginError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn load_failure(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        PluginError::LoadFailure {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn fetch(version: impl Into<String>, message: impl ToString) -> Self {
        PluginError::Fetch {
            version: version.into(),
            message: message.to_string(),
        }
    }

    /// Administrative failures are surfaced to the caller; everything else
    /// is logged and isolated to the plugin that caused it.
    pub fn is_administrative(&self) -> bool {
        matches!(
            self,
            PluginError::NotFound { .. }
                | PluginError::Filesystem { .. }
                | PluginError::Fetch { .. }
                | PluginError::InvalidName { .. }
                | PluginError::Watch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
