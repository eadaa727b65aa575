use thiserror::Error;

use crate::model::VersionedModule;

#[cfg(test)]
use mockall::{predicate::*, *};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("Authentication required for {0} (status {1})")]
    AuthRequired(String, u16),
    #[error("Request to {0} was rejected with status {1}")]
    Client(String, u16),
    #[error("Server error for {0} (status {1})")]
    Server(String, u16),
    #[error("{0} already exists in the repository")]
    AlreadyExists(String),
    #[error("Invalid repository path `{0}`")]
    InvalidPath(String),
    #[error("Unsupported repository url `{0}`")]
    UnsupportedScheme(String),
}

/// Access to the files of one repository. Paths are relative to the repository root and use `/`.
///
/// Writes between `begin_publish_transaction` and `commit_publish_transaction` belong
/// to one publication. Implementations that can stage writes only make them visible on
/// commit; the others write through and treat the transaction calls as markers.
#[cfg_attr(test, automock)]
pub trait Transport {
    fn describe(&self) -> String;

    fn exists(&self, path: &str) -> Result<bool, TransportError>;

    /// Content of the file, `None` when it does not exist.
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, TransportError>;

    fn put(&self, path: &str, content: &[u8], overwrite: bool) -> Result<(), TransportError>;

    /// Names of the entries of a directory, empty when it does not exist.
    fn list(&self, path: &str) -> Result<Vec<String>, TransportError>;

    fn begin_publish_transaction(&self, module: &VersionedModule) -> Result<(), TransportError>;

    fn commit_publish_transaction(&self) -> Result<(), TransportError>;

    fn abort_publish_transaction(&self) -> Result<(), TransportError>;
}

/// Rejects paths escaping the repository root.
pub(crate) fn checked_path(path: &str) -> Result<&str, TransportError> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.split('/').any(|segment| segment == "..") {
        return Err(TransportError::InvalidPath(path.to_string()));
    }
    Ok(trimmed)
}
