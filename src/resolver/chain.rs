use std::path::PathBuf;

use anyhow::{anyhow, bail};
use log::{debug, trace, warn};

use crate::{
    cache::ResolutionCache,
    descriptor::{DependencyArtifact, ModuleDescriptor},
    format::{
        ivy::parse_ivy,
        metadata::MavenMetadata,
        pom::{Pom, POM_EXTENSION},
    },
    model::{ModuleId, Version, VersionedModule},
    repository::{HttpSettings, Layout, RepoSet, Repository, Transport, TransportError},
};

use super::ModuleSource;

const MAX_PARENT_DEPTH: usize = 16;

/// Looks modules up in a list of repositories, first to last, keeping what it
/// finds in the resolution cache.
pub struct RepositoryChain<'a> {
    repositories: Vec<(Repository, Box<dyn Transport>)>,
    cache: &'a ResolutionCache,
    refresh: bool,
}

impl<'a> RepositoryChain<'a> {
    pub fn new(
        repositories: &RepoSet,
        cache: &'a ResolutionCache,
        refresh: bool,
        settings: &HttpSettings,
    ) -> Result<Self, TransportError> {
        let repositories = repositories
            .iter()
            .map(|repository| Ok((repository.clone(), repository.open_transport(settings)?)))
            .collect::<Result<Vec<_>, TransportError>>()?;
        Ok(RepositoryChain {
            repositories,
            cache,
            refresh,
        })
    }

    /// Cached content is only trusted for revisions that never change.
    fn use_cache(&self, version: &Version) -> bool {
        !self.refresh
            && !self
                .repositories
                .iter()
                .any(|(repository, _)| repository.is_changing(version))
    }

    /// The version written in file names: the timestamped one for unique snapshots.
    fn file_version(
        &self,
        repository: &Repository,
        transport: &dyn Transport,
        module: &VersionedModule,
        artifact: &DependencyArtifact,
    ) -> anyhow::Result<String> {
        if repository.layout().is_maven() && module.version().is_snapshot() {
            let path = repository.layout().version_metadata_path(module);
            if let Some(content) = transport.get(&path)? {
                let metadata = MavenMetadata::parse(&content)?;
                if let Some(value) =
                    metadata.snapshot_value(&artifact.extension, artifact.classifier.as_deref())
                {
                    trace!("{} of {} is deployed as {}", artifact.name, module, value);
                    return Ok(value);
                }
            }
        }
        Ok(module.version().to_string())
    }

    fn fetch(
        &self,
        repository: &Repository,
        transport: &dyn Transport,
        module: &VersionedModule,
        artifact: &DependencyArtifact,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let layout = repository.layout();
        let file_version = self.file_version(repository, transport, module, artifact)?;
        let found = transport.get(&layout.artifact_path(module, artifact, &file_version))?;
        if found.is_none() && file_version != module.version().as_str() {
            let literal = layout.artifact_path(module, artifact, module.version().as_str());
            return Ok(transport.get(&literal)?);
        }
        Ok(found)
    }

    /// Reads a POM from one repository, with everything inherited from its parents.
    fn load_pom(
        &self,
        repository: &Repository,
        transport: &dyn Transport,
        module: &VersionedModule,
        depth: usize,
    ) -> anyhow::Result<Option<Pom>> {
        let artifact = DependencyArtifact::new(module.module_id().name(), POM_EXTENSION);
        let Some(content) = self.fetch(repository, transport, module, &artifact)? else {
            return Ok(None);
        };
        let mut pom = Pom::parse(&content)?;
        if let Some(parent) = pom.parent_module()? {
            if depth >= MAX_PARENT_DEPTH {
                bail!("Parent chain of {} is deeper than {}", module, MAX_PARENT_DEPTH);
            }
            match self.find_pom(&parent, depth + 1)? {
                Some(parent_pom) => pom.inherit(&parent_pom),
                None => warn!("Parent {} of {} not found", parent, module),
            }
        }
        Ok(Some(pom))
    }

    fn find_pom(&self, module: &VersionedModule, depth: usize) -> anyhow::Result<Option<Pom>> {
        for (repository, transport) in &self.repositories {
            if !repository.layout().is_maven() {
                continue;
            }
            if let Some(pom) = self.load_pom(repository, transport.as_ref(), module, depth)? {
                return Ok(Some(pom));
            }
        }
        Ok(None)
    }

    fn read_descriptor(
        &self,
        repository: &Repository,
        transport: &dyn Transport,
        module: &VersionedModule,
    ) -> anyhow::Result<Option<ModuleDescriptor>> {
        match repository.layout() {
            Layout::Maven => match self.load_pom(repository, transport, module, 0)? {
                Some(pom) => Ok(Some(pom.to_descriptor(module)?)),
                None => Ok(None),
            },
            Layout::Ivy { .. } => {
                let path = repository.layout().descriptor_path(module);
                match transport.get(&path)? {
                    Some(content) => Ok(Some(parse_ivy(&content)?)),
                    None => Ok(None),
                }
            }
        }
    }

    fn repository_versions(
        &self,
        repository: &Repository,
        transport: &dyn Transport,
        module_id: &ModuleId,
    ) -> anyhow::Result<Vec<Version>> {
        let layout = repository.layout();
        if layout.is_maven() {
            if let Some(content) = transport.get(&layout.module_metadata_path(module_id))? {
                let versions = MavenMetadata::parse(&content)?.versions();
                if !versions.is_empty() {
                    return Ok(versions);
                }
            }
        }
        let listing = layout.version_listing(module_id);
        Ok(transport
            .list(&listing.directory)?
            .iter()
            .filter_map(|entry| listing.version_of(entry))
            .filter_map(|version| Version::new(version).ok())
            .collect())
    }
}

impl ModuleSource for RepositoryChain<'_> {
    fn descriptor(&self, module: &VersionedModule) -> anyhow::Result<Option<ModuleDescriptor>> {
        if self.use_cache(module.version()) {
            if let Some(descriptor) = self.cache.descriptor(module) {
                trace!("Using cached descriptor of {}", module);
                return Ok(Some(descriptor));
            }
        }

        let mut failure = None;
        for (repository, transport) in &self.repositories {
            match self.read_descriptor(repository, transport.as_ref(), module) {
                Ok(Some(descriptor)) => {
                    debug!("Found {} in {}", module, repository);
                    self.cache.store_descriptor(&descriptor)?;
                    return Ok(Some(descriptor));
                }
                Ok(None) => trace!("{} not found in {}", module, repository),
                Err(error) => {
                    warn!("Cannot read {} from {}: {:#}", module, repository, error);
                    failure = Some(error);
                }
            }
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(None),
        }
    }

    fn list_versions(&self, module_id: &ModuleId) -> anyhow::Result<Vec<Version>> {
        let mut versions = Vec::new();
        for (repository, transport) in &self.repositories {
            match self.repository_versions(repository, transport.as_ref(), module_id) {
                Ok(found) => {
                    for version in found {
                        if !versions.contains(&version) {
                            versions.push(version);
                        }
                    }
                }
                Err(error) => warn!(
                    "Cannot list versions of {} in {}: {:#}",
                    module_id, repository, error
                ),
            }
        }
        Ok(versions)
    }

    fn artifact(
        &self,
        module: &VersionedModule,
        artifact: &DependencyArtifact,
    ) -> anyhow::Result<PathBuf> {
        if self.use_cache(module.version()) {
            if let Some(path) = self.cache.artifact(module, artifact) {
                trace!("Using cached {}", path.display());
                return Ok(path);
            }
        }

        let mut failure = None;
        for (repository, transport) in &self.repositories {
            match self.fetch(repository, transport.as_ref(), module, artifact) {
                Ok(Some(content)) => {
                    debug!(
                        "Downloaded {} from {}",
                        artifact.file_name(module.version().as_str()),
                        repository
                    );
                    return Ok(self.cache.store_artifact(module, artifact, &content)?);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!("Cannot download from {}: {:#}", repository, error);
                    failure = Some(error);
                }
            }
        }
        Err(failure.unwrap_or_else(|| {
            anyhow!(
                "{} not found in any repository",
                artifact.file_name(module.version().as_str())
            )
        }))
    }
}
