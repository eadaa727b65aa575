//! Publication of modules to Maven and Ivy repositories.

mod ivy;
mod maven;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    descriptor::DependencyArtifact,
    format::{pom::PomExtras, FormatError},
    model::{DependencySet, VersionComparator, VersionedModule},
    repository::{HttpSettings, RepoSet, Repository, Transport, TransportError},
    resolver::ResolutionParameters,
};

#[cfg(test)]
use mockall::{predicate::*, *};

const SIGNATURE_EXTENSION: &str = "asc";

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("{0} is already published to {1}")]
    AlreadyPublished(String, String),
    #[error("Repository {0} requires signed artifacts but no signer is configured")]
    SignatureRequired(String),
    #[error("Cannot sign {0}: {1}")]
    Signing(String, anyhow::Error),
    #[error("Cannot read artifact {0}: {1}")]
    Artifact(PathBuf, std::io::Error),
    #[error("Repository error: {0}")]
    Transport(#[from] TransportError),
    #[error("Cannot write descriptor: {0}")]
    Format(#[from] FormatError),
}

/// Produces detached signatures of published files.
#[cfg_attr(test, automock)]
pub trait FileSigner {
    fn sign(&self, content: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// A file to publish and the artifact it is published as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishArtifact {
    pub artifact: DependencyArtifact,
    pub file: PathBuf,
}

impl PublishArtifact {
    pub fn new(artifact: DependencyArtifact, file: impl Into<PathBuf>) -> Self {
        PublishArtifact {
            artifact,
            file: file.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Publication {
    pub main_artifacts: Vec<PublishArtifact>,
    pub classified_artifacts: Vec<PublishArtifact>,
    pub descriptor_extras: PomExtras,
}

impl Publication {
    fn artifacts(&self) -> impl Iterator<Item = &PublishArtifact> {
        self.main_artifacts
            .iter()
            .chain(self.classified_artifacts.iter())
    }

    /// POM packaging: the extension of the main artifact.
    fn packaging(&self) -> &str {
        self.main_artifacts
            .first()
            .map(|main| main.artifact.extension.as_str())
            .unwrap_or("pom")
    }
}

struct LoadedArtifact<'p> {
    artifact: &'p DependencyArtifact,
    content: Vec<u8>,
}

fn load(artifact: &PublishArtifact) -> Result<LoadedArtifact<'_>, PublishError> {
    let content = std::fs::read(&artifact.file)
        .map_err(|error| PublishError::Artifact(artifact.file.clone(), error))?;
    Ok(LoadedArtifact {
        artifact: &artifact.artifact,
        content,
    })
}

/// Publishes one module to a set of repositories.
pub struct Publisher<'a> {
    module: &'a VersionedModule,
    publication: &'a Publication,
    dependencies: &'a DependencySet,
    signer: Option<&'a dyn FileSigner>,
    comparator: VersionComparator,
    parameters: ResolutionParameters,
    now: DateTime<Utc>,
}

impl<'a> Publisher<'a> {
    pub fn new(
        module: &'a VersionedModule,
        publication: &'a Publication,
        dependencies: &'a DependencySet,
    ) -> Self {
        Publisher {
            module,
            publication,
            dependencies,
            signer: None,
            comparator: VersionComparator::default(),
            parameters: ResolutionParameters::default(),
            now: Utc::now(),
        }
    }

    pub fn with_signer(mut self, signer: Option<&'a dyn FileSigner>) -> Self {
        self.signer = signer;
        self
    }

    /// Parameters of the descriptor published to Ivy repositories.
    pub fn with_parameters(mut self, parameters: ResolutionParameters) -> Self {
        self.comparator = parameters.version_comparator;
        self.parameters = parameters;
        self
    }

    /// Publishes to the Maven repositories of `repositories` and returns how many
    /// received the module.
    pub fn publish(
        &self,
        repositories: &RepoSet,
        settings: &HttpSettings,
    ) -> Result<usize, PublishError> {
        let targets = self.targets(repositories, true)?;
        let mut published = 0;
        for repository in targets {
            let transport = repository.open_transport(settings)?;
            self.publish_maven(repository, transport.as_ref())?;
            published += 1;
        }
        self.report(published);
        Ok(published)
    }

    /// Publishes to the Ivy repositories of `repositories` and returns how many
    /// received the module.
    pub fn publish_ivy(
        &self,
        repositories: &RepoSet,
        settings: &HttpSettings,
    ) -> Result<usize, PublishError> {
        let targets = self.targets(repositories, false)?;
        let mut published = 0;
        for repository in targets {
            let transport = repository.open_transport(settings)?;
            self.publish_ivy_to(repository, transport.as_ref())?;
            published += 1;
        }
        self.report(published);
        Ok(published)
    }

    fn report(&self, published: usize) {
        if published == 0 {
            warn!("{} was not published to any repository", self.module);
        } else {
            info!("Published {} to {} repositories", self.module, published);
        }
    }

    /// Repositories of the requested layout accepting the version. Fails when one of
    /// them requires signatures that cannot be produced.
    fn targets<'r>(
        &self,
        repositories: &'r RepoSet,
        maven: bool,
    ) -> Result<Vec<&'r Repository>, PublishError> {
        let mut targets = Vec::new();
        for repository in repositories {
            if repository.layout().is_maven() != maven {
                continue;
            }
            let config = repository.publish_config();
            if !config.version_filter.accepts(self.module.version()) {
                debug!(
                    "{} does not accept version {}, skipping it",
                    repository,
                    self.module.version()
                );
                continue;
            }
            if config.signature_required && self.signer.is_none() {
                return Err(PublishError::SignatureRequired(repository.to_string()));
            }
            targets.push(repository);
        }
        Ok(targets)
    }

    /// Runs `steps` inside a publish transaction, aborting it on failure.
    fn transaction(
        &self,
        transport: &dyn Transport,
        steps: impl FnOnce() -> Result<(), PublishError>,
    ) -> Result<(), PublishError> {
        transport.begin_publish_transaction(self.module)?;
        match steps().and_then(|()| Ok(transport.commit_publish_transaction()?)) {
            Ok(()) => Ok(()),
            Err(error) => {
                if let Err(abort) = transport.abort_publish_transaction() {
                    warn!(
                        "Failed to abort the publication of {} to {}: {}",
                        self.module,
                        transport.describe(),
                        abort
                    );
                }
                Err(error)
            }
        }
    }

    /// Uploads a file with its checksums, and its signature when `signed`.
    fn upload(
        &self,
        repository: &Repository,
        transport: &dyn Transport,
        path: &str,
        content: &[u8],
        overwrite: bool,
        signed: bool,
    ) -> Result<(), PublishError> {
        let config = repository.publish_config();
        debug!("Uploading {} to {}", path, repository);
        transport.put(path, content, overwrite)?;
        for algorithm in &config.checksums {
            let checksum = algorithm.digest(content);
            transport.put(
                &format!("{}.{}", path, algorithm.extension()),
                checksum.as_bytes(),
                overwrite,
            )?;
        }
        if signed && config.signature_required {
            if let Some(signer) = self.signer {
                let signature = signer
                    .sign(content)
                    .map_err(|error| PublishError::Signing(path.to_string(), error))?;
                transport.put(
                    &format!("{}.{}", path, SIGNATURE_EXTENSION),
                    &signature,
                    overwrite,
                )?;
            }
        }
        Ok(())
    }
}

/// Publishes `module` to the Maven repositories of `repositories`.
pub fn publish(
    module: &VersionedModule,
    publication: &Publication,
    dependencies: &DependencySet,
    repositories: &RepoSet,
    signer: Option<&dyn FileSigner>,
    settings: &HttpSettings,
) -> Result<usize, PublishError> {
    Publisher::new(module, publication, dependencies)
        .with_signer(signer)
        .publish(repositories, settings)
}

/// Publishes `module` to the Ivy repositories of `repositories`.
pub fn publish_ivy(
    module: &VersionedModule,
    publication: &Publication,
    dependencies: &DependencySet,
    parameters: &ResolutionParameters,
    repositories: &RepoSet,
    signer: Option<&dyn FileSigner>,
    settings: &HttpSettings,
) -> Result<usize, PublishError> {
    Publisher::new(module, publication, dependencies)
        .with_parameters(parameters.clone())
        .with_signer(signer)
        .publish_ivy(repositories, settings)
}
