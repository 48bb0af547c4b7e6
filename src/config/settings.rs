//! `.imdone/config.yml` model.
//!
//! Only the keys the plugin runtime consumes are typed; everything else in
//! the file is preserved in `extra` so the host can round-trip it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ConfigError, ConfigResult};

pub const CONFIG_DIR: &str = ".imdone";
pub const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default, rename = "devMode")]
    pub dev_mode: bool,

    /// Per-plugin settings keyed by the plugin's package name.
    #[serde(default)]
    pub plugins: HashMap<String, Value>,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl ProjectConfig {
    pub fn path_for(project_path: impl AsRef<Path>) -> PathBuf {
        project_path.as_ref().join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Reads the project's config file. A missing file yields defaults.
    pub async fn load(project_path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = Self::path_for(project_path);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        Self::parse(&content, &path)
    }

    pub fn parse(content: &str, path: &Path) -> ConfigResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_yaml_bw::from_str(content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        for (name, settings) in &self.plugins {
            if !settings.is_object() && !settings.is_null() {
                return Err(ConfigError::InvalidValue {
                    key: format!("plugins.{}", name),
                    message: "plugin settings must be a mapping".into(),
                });
            }
        }
        Ok(())
    }

    /// Settings object for one plugin, `{}` when none are configured.
    pub fn plugin_settings(&self, name: &str) -> Value {
        match self.plugins.get(name) {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            _ => Value::Object(Default::default()),
        }
    }

    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }

    pub fn with_plugin_settings(mut self, name: impl Into<String>, settings: Value) -> Self {
        self.plugins.insert(name.into(), settings);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_parse_dev_mode_and_plugins() {
        let yaml = r#"
devMode: true
plugins:
  imdone-epics:
    label: Epic
keepEmptyPriority: false
"#;
        let config = ProjectConfig::parse(yaml, Path::new("config.yml")).unwrap();
        assert!(config.dev_mode);
        assert_eq!(config.plugin_settings("imdone-epics"), json!({"label": "Epic"}));
        assert_eq!(config.extra.get("keepEmptyPriority"), Some(&json!(false)));
    }

    #[test]
    fn test_plugin_settings_default_to_empty_object() {
        let config = ProjectConfig::default();
        assert_eq!(config.plugin_settings("unknown"), json!({}));

        let config = ProjectConfig::default().with_plugin_settings("nulled", Value::Null);
        assert_eq!(config.plugin_settings("nulled"), json!({}));
    }

    #[test]
    fn test_rejects_non_mapping_plugin_settings() {
        let yaml = "plugins:\n  broken: 42\n";
        let result = ProjectConfig::parse(yaml, Path::new("config.yml"));
        assert!(matches!(result, Err(ConfigError::InvalidValue { ref key, .. }) if key == "plugins.broken"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let result = ProjectConfig::parse("devMode: [unclosed", Path::new("/p/config.yml"));
        match result {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, PathBuf::from("/p/config.yml")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_missing_file_defaults() {
        let dir = tempdir().unwrap();
        let config = ProjectConfig::load(dir.path()).await.unwrap();
        assert_eq!(config, ProjectConfig::default());
    }

    #[tokio::test]
    async fn test_load_from_project() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        std::fs::write(ProjectConfig::path_for(dir.path()), "devMode: true\n").unwrap();

        let config = ProjectConfig::load(dir.path()).await.unwrap();
        assert!(config.dev_mode);
        assert!(config.plugins.is_empty());
    }
}
