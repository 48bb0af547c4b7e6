use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::PluginError;

pub(super) const PACKAGE_FILE: &str = "package.json";

/// Packaging internals that never reach metadata consumers.
const STRIPPED_FIELDS: &[&str] = &["dependencies", "devDependencies", "scripts", "main"];

/// Plugin metadata exposed to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PluginInfo {
    /// Metadata used when a plugin ships no package file.
    pub fn fallback(path: &Path) -> Self {
        Self {
            name: path.display().to_string(),
            version: None,
            path: path.to_path_buf(),
            schema: None,
            extra: Map::new(),
        }
    }

    /// Reads `<path>/package.json`, stripping packaging fields. `path` is
    /// always recorded as the load directory, whatever the file says.
    pub async fn read(path: &Path) -> Result<Self, PluginError> {
        let file = path.join(PACKAGE_FILE);
        let content = tokio::fs::read_to_string(&file)
            .await
            .map_err(|_| PluginError::MetadataMissing {
                path: path.to_path_buf(),
            })?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, PluginError> {
        let mut package: Map<String, Value> = serde_json::from_str(content)?;
        for field in STRIPPED_FIELDS {
            package.remove(*field);
        }
        package.insert("path".into(), Value::String(path.display().to_string()));
        if !matches!(package.get("name"), Some(Value::String(_))) {
            package.insert("name".into(), Value::String(path.display().to_string()));
        }
        if !matches!(package.get("version"), Some(Value::String(_))) {
            package.remove("version");
        }
        let mut info: Self = serde_json::from_value(Value::Object(package))?;
        info.path = path.to_path_buf();
        Ok(info)
    }
}

/// Reads just the `main` entry of a package file, before it is stripped.
pub(super) fn package_main(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path.join(PACKAGE_FILE)).ok()?;
    let package: Map<String, Value> = serde_json::from_str(&content).ok()?;
    package.get("main")?.as_str().map(str::to_string)
}
