use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::{debug, trace};

use crate::{
    model::VersionedModule,
    repository::transport::{checked_path, Transport, TransportError},
};

/// A repository on the local file system.
///
/// Writes made during a publish transaction are staged in memory and only land on
/// disk when the transaction is committed.
pub struct FileTransport {
    root: PathBuf,
    staged: Mutex<Option<Vec<(String, Vec<u8>)>>>,
}

impl FileTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileTransport {
            root: root.into(),
            staged: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, TransportError> {
        Ok(self.root.join(checked_path(path)?))
    }

    fn staged(&self) -> MutexGuard<'_, Option<Vec<(String, Vec<u8>)>>> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, path: &str, content: &[u8]) -> Result<(), TransportError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        trace!("Writing {}", target.display());
        fs::write(target, content)?;
        Ok(())
    }
}

impl Transport for FileTransport {
    fn describe(&self) -> String {
        format!("file repository {}", self.root.display())
    }

    fn exists(&self, path: &str) -> Result<bool, TransportError> {
        let key = checked_path(path)?;
        if let Some(staged) = self.staged().as_ref() {
            if staged.iter().any(|(p, _)| p == key) {
                return Ok(true);
            }
        }
        Ok(self.resolve(path)?.is_file())
    }

    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, TransportError> {
        let key = checked_path(path)?;
        if let Some(staged) = self.staged().as_ref() {
            if let Some((_, content)) = staged.iter().rev().find(|(p, _)| p == key) {
                return Ok(Some(content.clone()));
            }
        }
        let file = self.resolve(path)?;
        if !file.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read(file)?))
    }

    fn put(&self, path: &str, content: &[u8], overwrite: bool) -> Result<(), TransportError> {
        if !overwrite && self.exists(path)? {
            return Err(TransportError::AlreadyExists(path.to_string()));
        }
        let key = checked_path(path)?.to_string();
        if let Some(pending) = self.staged().as_mut() {
            pending.retain(|(p, _)| p != &key);
            pending.push((key, content.to_vec()));
            return Ok(());
        }
        self.write(&key, content)
    }

    fn list(&self, path: &str) -> Result<Vec<String>, TransportError> {
        let directory = self.resolve(path)?;
        if !directory.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(directory)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort();
        Ok(entries)
    }

    fn begin_publish_transaction(&self, module: &VersionedModule) -> Result<(), TransportError> {
        debug!("Staging publication of {} to {}", module, self.describe());
        *self.staged() = Some(Vec::new());
        Ok(())
    }

    fn commit_publish_transaction(&self) -> Result<(), TransportError> {
        let pending = self.staged().take().unwrap_or_default();
        for (path, content) in &pending {
            self.write(path, content)?;
        }
        debug!("Committed {} files to {}", pending.len(), self.describe());
        Ok(())
    }

    fn abort_publish_transaction(&self) -> Result<(), TransportError> {
        if let Some(pending) = self.staged().take() {
            debug!(
                "Discarding {} staged files for {}",
                pending.len(),
                self.describe()
            );
        }
        Ok(())
    }
}
