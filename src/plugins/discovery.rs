use std::path::{Path, PathBuf};

use super::PluginError;

/// Dependency folder inside a plugin directory; never a plugin itself.
pub(super) const RESERVED_DIR: &str = "node_modules";

/// Prefix of the scratch folders packages are unpacked into during install.
pub(super) const STAGING_PREFIX: &str = ".fetch-";

fn is_reserved_name(name: &std::ffi::OsStr) -> bool {
    name == RESERVED_DIR || name.to_str().is_some_and(|n| n.starts_with(STAGING_PREFIX))
}

pub struct PluginDiscovery;

impl PluginDiscovery {
    /// Lists candidate plugin locations under `dir`: subdirectories and
    /// symlinks, sorted by name, excluding `node_modules` and install
    /// staging folders.
    ///
    /// A missing directory yields no candidates. Any other enumeration
    /// failure is returned.
    pub async fn discover(dir: &Path) -> Result<Vec<PathBuf>, PluginError> {
        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| PluginError::filesystem(dir, e))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PluginError::filesystem(dir, e))?
        {
            if is_reserved_name(&entry.file_name()) {
                continue;
            }
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| PluginError::filesystem(entry.path(), e))?;
            if file_type.is_dir() || file_type.is_symlink() {
                paths.push(entry.path());
            }
        }

        paths.sort();
        Ok(paths)
    }

    /// Whether a changed path lies inside a dependency or staging folder.
    pub fn is_reserved(path: &Path) -> bool {
        path.components()
            .any(|component| is_reserved_name(component.as_os_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_discover_sorted_directories() {
        let dir = tempdir().unwrap();
        for name in ["zeta", "alpha", "node_modules", ".fetch-x1y2", "mid"] {
            std::fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("README.md"), "not a plugin").unwrap();

        let found = PluginDiscovery::discover(dir.path()).await.unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_discover_includes_symlinks() {
        let dir = tempdir().unwrap();
        let target = tempdir().unwrap();
        std::os::unix::fs::symlink(target.path(), dir.path().join("linked")).unwrap();

        let found = PluginDiscovery::discover(dir.path()).await.unwrap();
        assert_eq!(found, vec![dir.path().join("linked")]);
    }

    #[tokio::test]
    async fn test_discover_missing_directory() {
        let dir = tempdir().unwrap();
        let found = PluginDiscovery::discover(&dir.path().join("absent"))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_discover_not_a_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plugins");
        std::fs::write(&file, "").unwrap();

        let err = PluginDiscovery::discover(&file).await.unwrap_err();
        assert!(matches!(err, PluginError::Filesystem { .. }));
    }

    #[test]
    fn test_is_reserved() {
        assert!(PluginDiscovery::is_reserved(Path::new(
            "/p/epics/node_modules/lodash/index.js"
        )));
        assert!(PluginDiscovery::is_reserved(Path::new(
            "/p/.fetch-a1b2/epics-main/index.js"
        )));
        assert!(!PluginDiscovery::is_reserved(Path::new(
            "/board/.imdone/plugins/epics/index.js"
        )));
    }
}
