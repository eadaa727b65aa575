use std::{
    collections::BTreeMap,
    fmt::Write as _,
    path::{Path, PathBuf},
};

use log::{debug, info, trace, warn};
use thiserror::Error;

use crate::{
    descriptor::{DependencyArtifact, ModuleDescriptor},
    flock::FileLock,
    format::{
        ivy::{parse_ivy, write_ivy, IVY_FILE_NAME},
        FormatError,
    },
    model::{ModuleId, Version, VersionedModule},
};

const LOCK_FILE_NAME: &str = ".lock";
const MODULES_DIR: &str = "modules";
const RESOLUTIONS_DIR: &str = "resolutions";

/// On-disk cache of descriptors and artifacts fetched from repositories, plus the
/// record of past resolutions. The cache directory is locked for the lifetime of
/// this value.
pub struct ResolutionCache {
    location: PathBuf,
    _lock: FileLock,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache location {location} is not a directory")]
    BadLocation { location: String },
    #[error("Cache lock cannot be acquired")]
    Lock(#[from] crate::flock::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Cannot write cached descriptor: {0}")]
    Format(#[from] FormatError),
}

impl ResolutionCache {
    pub fn new(location: PathBuf) -> Result<ResolutionCache, CacheError> {
        if location.exists() {
            if !location.is_dir() {
                return Err(CacheError::BadLocation {
                    location: location.to_string_lossy().to_string(),
                });
            }
        } else {
            std::fs::create_dir_all(&location)?;
        }

        let lock_path = location.join(LOCK_FILE_NAME);
        debug!(
            "Acquiring a lock on the cache location: {}",
            lock_path.display()
        );
        let lock = FileLock::new(&lock_path)?;
        trace!("Acquired a lock on the cache location");
        Ok(ResolutionCache {
            location,
            _lock: lock,
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    fn module_directory(&self, module: &VersionedModule) -> PathBuf {
        self.location
            .join(MODULES_DIR)
            .join(module.module_id().group())
            .join(module.module_id().name())
            .join(module.version().as_str())
    }

    pub fn descriptor_path(&self, module: &VersionedModule) -> PathBuf {
        self.module_directory(module).join(IVY_FILE_NAME)
    }

    pub fn artifact_path(&self, module: &VersionedModule, artifact: &DependencyArtifact) -> PathBuf {
        self.module_directory(module)
            .join(artifact.file_name(module.version().as_str()))
    }

    /// The cached descriptor of a module. Unreadable entries count as missing.
    pub fn descriptor(&self, module: &VersionedModule) -> Option<ModuleDescriptor> {
        let path = self.descriptor_path(module);
        let content = std::fs::read(&path).ok()?;
        match parse_ivy(&content) {
            Ok(descriptor) => Some(descriptor),
            Err(error) => {
                warn!(
                    "Ignoring corrupted cache entry {}: {}",
                    path.display(),
                    error
                );
                None
            }
        }
    }

    pub fn store_descriptor(&self, descriptor: &ModuleDescriptor) -> Result<(), CacheError> {
        let path = self.descriptor_path(&descriptor.id);
        write_file(&path, write_ivy(descriptor)?.as_bytes())
    }

    pub fn artifact(&self, module: &VersionedModule, artifact: &DependencyArtifact) -> Option<PathBuf> {
        let path = self.artifact_path(module, artifact);
        path.is_file().then_some(path)
    }

    pub fn store_artifact(
        &self,
        module: &VersionedModule,
        artifact: &DependencyArtifact,
        content: &[u8],
    ) -> Result<PathBuf, CacheError> {
        let path = self.artifact_path(module, artifact);
        write_file(&path, content)?;
        Ok(path)
    }

    /// Files recording the resolution of a root module: its descriptor and the resolved versions.
    pub fn resolution_files(&self, module: &VersionedModule) -> (PathBuf, PathBuf) {
        let base = format!(
            "resolved-{}-{}-{}",
            module.module_id().group(),
            module.module_id().name(),
            module.version()
        );
        let directory = self.location.join(RESOLUTIONS_DIR);
        (
            directory.join(format!("{}.xml", base)),
            directory.join(format!("{}.properties", base)),
        )
    }

    pub fn save_resolution(
        &self,
        root: &ModuleDescriptor,
        resolved: &BTreeMap<ModuleId, Version>,
    ) -> Result<(), CacheError> {
        let (descriptor_file, properties_file) = self.resolution_files(&root.id);
        write_file(&descriptor_file, write_ivy(root)?.as_bytes())?;

        let mut properties = String::new();
        for (module_id, version) in resolved {
            let _ = writeln!(
                properties,
                "{}#{}={}",
                module_id.group(),
                module_id.name(),
                version
            );
        }
        write_file(&properties_file, properties.as_bytes())?;
        trace!("Saved resolution of {}", root.id);
        Ok(())
    }

    /// Removes everything cached under the identity of `module`.
    pub fn purge(&self, module: &VersionedModule) -> Result<(), CacheError> {
        let (descriptor_file, properties_file) = self.resolution_files(module);
        remove_if_exists(&descriptor_file)?;
        remove_if_exists(&properties_file)?;
        let directory = self.module_directory(module);
        if directory.exists() {
            std::fs::remove_dir_all(directory)?;
        }
        debug!("Purged cache entries of {}", module);
        Ok(())
    }

    /// Removes every cached file, keeping the lock.
    pub fn clear(&self) -> Result<(), CacheError> {
        info!("Clearing mvnfetch cache {}.", self.location.display());
        for directory in [MODULES_DIR, RESOLUTIONS_DIR] {
            let path = self.location.join(directory);
            if path.exists() {
                std::fs::remove_dir_all(path)?;
            }
        }
        Ok(())
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), CacheError> {
    match std::fs::remove_file(path) {
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        otherwise => Ok(otherwise?),
    }
}
