//! Package retrieval for plugin installs.
//!
//! [`PackageFetcher`] places a package's files into a directory. The default
//! [`TarballFetcher`] downloads a gzipped tarball over HTTP and unpacks it,
//! dropping the archive's single top-level folder. Link entries are skipped
//! and nothing is written outside the destination.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use super::PluginError;
use super::discovery::STAGING_PREFIX;

const GITHUB_CODELOAD: &str = "https://codeload.github.com";
const DEFAULT_REF: &str = "HEAD";
const HTTP_TIMEOUT_SECS: u64 = 120;

static HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

fn get_http_client() -> &'static reqwest::Client {
    HTTP_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default()
    })
}

/// Retrieves a package and writes its files into `dest`.
#[async_trait]
pub trait PackageFetcher: Send + Sync {
    /// On success `dest` holds the package contents, replacing whatever was
    /// there before.
    async fn fetch(&self, version: &str, dest: &Path) -> Result<(), PluginError>;
}

/// Fetches `.tar.gz` packages over HTTP(S).
///
/// `version` is either a full `http(s)://` URL to an archive, or a GitHub
/// shorthand `owner/repo[#ref]` (optionally prefixed `github:`), fetched
/// from codeload at `ref` or `HEAD`.
#[derive(Clone, Debug)]
pub struct TarballFetcher {
    client: Option<reqwest::Client>,
    github_base: String,
}

impl Default for TarballFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TarballFetcher {
    pub fn new() -> Self {
        Self {
            client: None,
            github_base: GITHUB_CODELOAD.to_string(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Overrides the host GitHub shorthands are resolved against.
    pub fn github_base(mut self, base: impl Into<String>) -> Self {
        self.github_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn client(&self) -> &reqwest::Client {
        match &self.client {
            Some(client) => client,
            None => get_http_client(),
        }
    }

    /// Archive URL for a version specifier.
    pub fn source_url(&self, version: &str) -> Result<String, PluginError> {
        let version = version.trim();
        if version.starts_with("https://") || version.starts_with("http://") {
            return Ok(version.to_string());
        }

        let shorthand = version.strip_prefix("github:").unwrap_or(version);
        let (repo, git_ref) = match shorthand.split_once('#') {
            Some((repo, git_ref)) if !git_ref.is_empty() => (repo, git_ref),
            Some((repo, _)) => (repo, DEFAULT_REF),
            None => (shorthand, DEFAULT_REF),
        };

        match repo.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(format!(
                    "{}/{}/{}/tar.gz/{}",
                    self.github_base, owner, name, git_ref
                ))
            }
            _ => Err(PluginError::fetch(
                version,
                "expected an archive URL or owner/repo[#ref]",
            )),
        }
    }
}

#[async_trait]
impl PackageFetcher for TarballFetcher {
    async fn fetch(&self, version: &str, dest: &Path) -> Result<(), PluginError> {
        let url = self.source_url(version)?;
        tracing::debug!(url = %url, dest = %dest.display(), "Downloading plugin package");

        let response = self
            .client()
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PluginError::fetch(version, e))?;
        let archive = response
            .bytes()
            .await
            .map_err(|e| PluginError::fetch(version, e))?;

        let dest_owned = dest.to_path_buf();
        tokio::task::spawn_blocking(move || unpack_tarball(&archive, &dest_owned))
            .await
            .map_err(|e| PluginError::fetch(version, e))?
            .map_err(|e| PluginError::fetch(version, e))?;

        tracing::debug!(dest = %dest.display(), "Unpacked plugin package");
        Ok(())
    }
}

/// Unpacks into a staging directory next to `dest`, then swaps the
/// archive's single top-level folder in for `dest`. `dest` is left as it
/// was if the archive is unreadable or rejected.
fn unpack_tarball(bytes: &[u8], dest: &Path) -> io::Result<()> {
    let parent = dest.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no parent directory for {}", dest.display()),
        )
    })?;
    std::fs::create_dir_all(parent)?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(parent)?;

    let mut archive = Archive::new(GzDecoder::new(bytes));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_type = entry.header().entry_type();
        if matches!(entry_type, EntryType::XGlobalHeader | EntryType::XHeader) {
            continue;
        }
        let entry_path = entry.path()?.into_owned();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            tracing::debug!(entry = %entry_path.display(), "Skipping link in plugin package");
            continue;
        }
        if !entry.unpack_in(staging.path())? {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("archive entry escapes destination: {}", entry_path.display()),
            ));
        }
    }

    let root = package_root(staging.path())?;
    swap_into_place(&root, dest, staging.path())
}

/// The one directory an archive unpacked to.
fn package_root(staging: &Path) -> io::Result<PathBuf> {
    let mut entries = std::fs::read_dir(staging)?.collect::<io::Result<Vec<_>>>()?;
    match entries.pop() {
        Some(entry) if entries.is_empty() && entry.file_type()?.is_dir() => Ok(entry.path()),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "archive must contain a single top-level directory",
        )),
    }
}

/// Moves `root` to `dest`. A previous `dest` is parked inside `staging`
/// and put back if the move fails.
fn swap_into_place(root: &Path, dest: &Path, staging: &Path) -> io::Result<()> {
    let parked = staging.join(".previous");
    let had_previous = std::fs::symlink_metadata(dest).is_ok();
    if had_previous {
        std::fs::rename(dest, &parked)?;
    }
    if let Err(e) = std::fs::rename(root, dest) {
        if had_previous {
            let _ = std::fs::rename(&parked, dest);
        }
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn escaping_tarball() -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let content = b"owned";
        let mut header = tar::Header::new_old();
        let name = b"pkg/../../escaped.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &content[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_source_url() {
        let fetcher = TarballFetcher::new();
        assert_eq!(
            fetcher.source_url("imdone/imdone-epics").unwrap(),
            "https://codeload.github.com/imdone/imdone-epics/tar.gz/HEAD"
        );
        assert_eq!(
            fetcher.source_url("github:imdone/links#v1.2.0").unwrap(),
            "https://codeload.github.com/imdone/links/tar.gz/v1.2.0"
        );
        assert_eq!(
            fetcher.source_url("https://example.com/p.tar.gz").unwrap(),
            "https://example.com/p.tar.gz"
        );
        assert!(fetcher.source_url("1.0.0").is_err());
        assert!(fetcher.source_url("a/b/c").is_err());
    }

    fn leftover_staging(parent: &Path) -> usize {
        std::fs::read_dir(parent)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
            .count()
    }

    #[test]
    fn test_unpack_rejects_flat_archive() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("flat");
        let body = tarball(&[("package.json", r#"{"name":"flat"}"#)]);

        let err = unpack_tarball(&body, &dest).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(!dest.exists());
        assert_eq!(leftover_staging(dir.path()), 0);
    }

    #[test]
    fn test_unpack_keeps_previous_install_on_bad_archive() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("epics");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("package.json"), r#"{"name":"epics"}"#).unwrap();

        assert!(unpack_tarball(b"definitely not gzip", &dest).is_err());
        assert!(unpack_tarball(&escaping_tarball(), &dest).is_err());

        assert!(dest.join("package.json").is_file());
        assert_eq!(leftover_staging(dir.path()), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_skips_link_entries() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let dest = dir.path().join("linked");

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut link = tar::Header::new_gnu();
        link.set_entry_type(EntryType::Symlink);
        link.set_size(0);
        link.set_mode(0o777);
        builder
            .append_link(&mut link, "pkg/link", outside.path())
            .unwrap();
        let content = b"written through link";
        let mut file = tar::Header::new_gnu();
        file.set_size(content.len() as u64);
        file.set_mode(0o644);
        builder
            .append_data(&mut file, "pkg/link/pwned.txt", &content[..])
            .unwrap();
        let body = builder.into_inner().unwrap().finish().unwrap();

        unpack_tarball(&body, &dest).unwrap();

        assert!(!outside.path().join("pwned.txt").exists());
        let link_path = dest.join("link");
        assert!(!std::fs::symlink_metadata(&link_path).unwrap().is_symlink());
        assert!(link_path.join("pwned.txt").is_file());
    }

    #[tokio::test]
    async fn test_fetch_unpacks_archive() {
        let server = MockServer::start().await;
        let body = tarball(&[
            ("epics-main/package.json", r#"{"name":"epics","version":"1.0.0"}"#),
            ("epics-main/lib/index.js", "module.exports = {}"),
        ]);
        Mock::given(method("GET"))
            .and(path("/imdone/epics/tar.gz/main"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("epics");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.txt"), "old").unwrap();

        let fetcher = TarballFetcher::new().github_base(server.uri());
        fetcher.fetch("imdone/epics#main", &dest).await.unwrap();

        let package = std::fs::read_to_string(dest.join("package.json")).unwrap();
        assert!(package.contains("\"epics\""));
        assert!(dest.join("lib/index.js").is_file());
        assert!(!dest.join("stale.txt").exists());
        assert_eq!(leftover_staging(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let fetcher = TarballFetcher::new();
        let url = format!("{}/missing.tar.gz", server.uri());
        let err = fetcher.fetch(&url, &dir.path().join("x")).await.unwrap_err();
        assert!(matches!(err, PluginError::Fetch { .. }));
        assert!(!dir.path().join("x").exists());
    }

    #[tokio::test]
    async fn test_fetch_rejects_escaping_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/evil.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(escaping_tarball()))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("plugins").join("evil");
        let err = TarballFetcher::new()
            .fetch(&format!("{}/evil.tar.gz", server.uri()), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Fetch { .. }));
        assert!(!dir.path().join("escaped.txt").exists());
    }
}
