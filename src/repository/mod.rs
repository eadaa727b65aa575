//! Repositories modules are resolved from and published to.

pub mod file;
pub mod http;
pub mod layout;
pub mod transport;

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    path::Path,
};

use md5::Md5;
use regex_lite::Regex;
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use url::Url;

use crate::model::{ParseError, Version};

pub use file::FileTransport;
pub use http::{HttpSettings, HttpTransport};
pub use layout::Layout;
pub use transport::{Transport, TransportError};

pub const DEFAULT_CHANGING_PATTERN: &str = ".*-SNAPSHOT";
pub const MAVEN_CENTRAL_URL: &str = "https://repo1.maven.org/maven2/";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub realm: Option<String>,
    pub username: String,
    pub password: String,
}

/// Which versions a repository accepts for publication.
#[derive(Debug, Clone, Default)]
pub enum VersionFilter {
    #[default]
    All,
    Releases,
    Snapshots,
    Matching(Regex),
}

impl VersionFilter {
    pub fn matching(pattern: &str) -> Result<Self, ParseError> {
        Ok(VersionFilter::Matching(Regex::new(&format!(
            "^(?:{})$",
            pattern
        ))?))
    }

    pub fn accepts(&self, version: &Version) -> bool {
        match self {
            VersionFilter::All => true,
            VersionFilter::Releases => !version.is_snapshot(),
            VersionFilter::Snapshots => version.is_snapshot(),
            VersionFilter::Matching(pattern) => pattern.is_match(version.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    pub fn extension(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
        }
    }

    /// Lowercase hex digest of `content`.
    pub fn digest(&self, content: &[u8]) -> String {
        match self {
            ChecksumAlgorithm::Md5 => hex::encode(Md5::digest(content)),
            ChecksumAlgorithm::Sha1 => hex::encode(Sha1::digest(content)),
            ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(content)),
            ChecksumAlgorithm::Sha512 => hex::encode(Sha512::digest(content)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub version_filter: VersionFilter,
    pub unique_snapshot: bool,
    pub checksums: Vec<ChecksumAlgorithm>,
    pub signature_required: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        PublishConfig {
            version_filter: VersionFilter::All,
            unique_snapshot: true,
            checksums: vec![ChecksumAlgorithm::Md5, ChecksumAlgorithm::Sha1],
            signature_required: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Repository {
    url: Url,
    credentials: Option<Credentials>,
    headers: BTreeMap<String, BTreeMap<String, String>>,
    layout: Layout,
    changing_pattern: Regex,
    publish: PublishConfig,
}

impl Repository {
    /// A repository at an `http(s)://` or `file://` url, or at a plain file system path.
    pub fn new(location: &str) -> Result<Self, ParseError> {
        let location = location.trim();
        let invalid = |reason: &str| {
            ParseError::InvalidRepository(location.to_string(), reason.to_string())
        };
        let mut url = if location.contains("://") {
            Url::parse(location)?
        } else {
            let path = Path::new(location);
            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()?.join(path)
            };
            Url::from_directory_path(&absolute)
                .map_err(|_| invalid("not a usable file system path"))?
        };
        match url.scheme() {
            "http" | "https" | "file" => {}
            other => return Err(invalid(&format!("unsupported scheme {}", other))),
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Repository {
            url,
            credentials: None,
            headers: BTreeMap::new(),
            layout: Layout::Maven,
            changing_pattern: Regex::new(&format!("^(?:{})$", DEFAULT_CHANGING_PATTERN))?,
            publish: PublishConfig::default(),
        })
    }

    pub fn maven_central() -> Result<Self, ParseError> {
        Repository::new(MAVEN_CENTRAL_URL)
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Headers sent with every request whose url starts with `url_prefix`.
    pub fn with_headers(mut self, url_prefix: &str, headers: BTreeMap<String, String>) -> Self {
        self.headers
            .entry(url_prefix.to_string())
            .or_default()
            .extend(headers);
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_changing_pattern(mut self, pattern: &str) -> Result<Self, ParseError> {
        self.changing_pattern = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(self)
    }

    pub fn with_publish_config(mut self, publish: PublishConfig) -> Self {
        self.publish = publish;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn publish_config(&self) -> &PublishConfig {
        &self.publish
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_local(&self) -> bool {
        self.url.scheme() == "file"
    }

    /// Whether content published under `version` may change over time.
    pub fn is_changing(&self, version: &Version) -> bool {
        self.changing_pattern.is_match(version.as_str())
    }

    pub fn open_transport(
        &self,
        settings: &HttpSettings,
    ) -> Result<Box<dyn Transport>, TransportError> {
        match self.url.scheme() {
            "file" => {
                let root = self
                    .url
                    .to_file_path()
                    .map_err(|_| TransportError::UnsupportedScheme(self.url.to_string()))?;
                Ok(Box::new(FileTransport::new(root)))
            }
            "http" | "https" => Ok(Box::new(HttpTransport::new(
                self.url.clone(),
                self.credentials.clone(),
                self.headers.clone(),
                settings,
            )?)),
            _ => Err(TransportError::UnsupportedScheme(self.url.to_string())),
        }
    }
}

impl Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// An ordered set of repositories, looked up first to last.
#[derive(Debug, Clone, Default)]
pub struct RepoSet {
    repositories: Vec<Repository>,
}

impl RepoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(repositories: Vec<Repository>) -> Self {
        RepoSet { repositories }
    }

    pub fn and(mut self, repository: Repository) -> Self {
        self.repositories.push(repository);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Repository> {
        self.repositories.iter()
    }
}

impl<'a> IntoIterator for &'a RepoSet {
    type Item = &'a Repository;
    type IntoIter = std::slice::Iter<'a, Repository>;

    fn into_iter(self) -> Self::IntoIter {
        self.repositories.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parse_locations() {
        let remote = Repository::new("https://repo.acme.org/maven").unwrap();
        assert_eq!(remote.url().as_str(), "https://repo.acme.org/maven/");
        assert!(!remote.is_local());

        let dir = tempfile::tempdir().unwrap();
        let local = Repository::new(dir.path().to_str().unwrap()).unwrap();
        assert!(local.is_local());
        assert!(local.url().as_str().ends_with('/'));

        assert!(matches!(
            Repository::new("ftp://repo.acme.org"),
            Err(ParseError::InvalidRepository(_, _))
        ));
    }

    #[test]
    fn changing_versions() {
        let repository = Repository::new("https://repo.acme.org/maven").unwrap();
        assert!(repository.is_changing(&Version::new("1.0-SNAPSHOT").unwrap()));
        assert!(!repository.is_changing(&Version::new("1.0").unwrap()));

        let nightly = repository.with_changing_pattern(".*-nightly").unwrap();
        assert!(nightly.is_changing(&Version::new("2.0-nightly").unwrap()));
    }

    #[test]
    fn version_filters() {
        let snapshot = Version::new("1.0-SNAPSHOT").unwrap();
        let release = Version::new("1.0").unwrap();
        assert!(VersionFilter::All.accepts(&snapshot));
        assert!(!VersionFilter::Releases.accepts(&snapshot));
        assert!(VersionFilter::Releases.accepts(&release));
        assert!(VersionFilter::Snapshots.accepts(&snapshot));
        let matching = VersionFilter::matching(r"1\..*").unwrap();
        assert!(matching.accepts(&release));
        assert!(!matching.accepts(&Version::new("2.0").unwrap()));
    }

    #[test]
    fn checksums() {
        assert_eq!(
            ChecksumAlgorithm::Md5.digest(b"hello"),
            "5d41402abc4b2a76b9719d911017c592"
        );
        assert_eq!(
            ChecksumAlgorithm::Sha1.digest(b"hello"),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
        assert_eq!(
            ChecksumAlgorithm::Sha256.digest(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(ChecksumAlgorithm::Sha512.digest(b"hello").len(), 128);
    }

    #[test]
    fn open_file_transport() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Repository::new(dir.path().to_str().unwrap()).unwrap();
        let transport = repository.open_transport(&HttpSettings::default()).unwrap();
        transport.put("a.txt", b"a", false).unwrap();
        assert!(dir.path().join("a.txt").is_file());
    }
}
