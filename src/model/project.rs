//! The `mvnfetch.toml` project file.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::{debug, error};
use serde::Deserialize;

use crate::{
    descriptor::{DependencyArtifact, MatcherKind},
    format::pom::{Developer, License, PomExtras, Scm},
    model::{
        DependencySet, Exclusion, ModuleDependency, ModuleId, ParseError, Transitivity, Version,
        VersionComparator, VersionProvider, VersionedModule,
    },
    publish::{PublishArtifact, Publication},
    repository::{
        layout::{DEFAULT_IVY_ARTIFACT_PATTERN, DEFAULT_IVY_DESCRIPTOR_PATTERN},
        ChecksumAlgorithm, Credentials, Layout, PublishConfig, RepoSet, Repository,
        VersionFilter,
    },
    resolver::{ConflictStrategy, ResolutionParameters},
    scope::ConfigurationMapping,
};

/// Everything a project declares: who it is, where it resolves from and
/// publishes to, what it depends on and what it publishes.
#[derive(Debug, Clone)]
pub struct Project {
    pub module: VersionedModule,
    pub repositories: RepoSet,
    pub publish_repositories: RepoSet,
    pub parameters: ResolutionParameters,
    pub dependencies: DependencySet,
    pub publication: Publication,
}

impl Project {
    pub fn from_file(path: &Path) -> Result<Project, ParseError> {
        debug!("Attempting to read project from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let root = path.parent().unwrap_or(Path::new("."));

        let project = Project::from_toml_str(&contents, root);
        if let Err(err) = &project {
            error!("Could not build a valid project from {}: {err}", path.display())
        }
        project
    }

    /// Parses a project file. Relative publication files are resolved against `root`.
    pub fn from_toml_str(data: &str, root: &Path) -> Result<Project, ParseError> {
        let raw = toml::from_str::<RawProject>(data)?;
        let module = raw.module.parse::<VersionedModule>()?;

        let repositories = raw
            .repositories
            .into_iter()
            .map(RawRepository::into_repository)
            .collect::<Result<Vec<_>, _>>()?;
        let publish_repositories = raw
            .publish_repositories
            .into_iter()
            .map(RawRepository::into_repository)
            .collect::<Result<Vec<_>, _>>()?;

        let mut dependencies = DependencySet::new();
        for dependency in raw.dependencies {
            dependencies = dependencies.and(dependency.into_dependency()?);
        }
        for exclusion in &raw.exclusions {
            dependencies = dependencies.with_global_exclusion(exclusion.parse()?);
        }
        let mut overrides = VersionProvider::new();
        for (module_id, version) in raw.overrides {
            overrides.insert(module_id.parse::<ModuleId>()?, Version::new(version)?);
        }
        let dependencies = dependencies.with_version_provider(overrides);

        let publication = raw
            .publication
            .unwrap_or_default()
            .into_publication(&module, root);

        Ok(Project {
            module,
            repositories: RepoSet::of(repositories),
            publish_repositories: RepoSet::of(publish_repositories),
            parameters: raw.parameters.into_parameters()?,
            dependencies,
            publication,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProject {
    module: String,
    #[serde(default)]
    repositories: Vec<RawRepository>,
    #[serde(default)]
    publish_repositories: Vec<RawRepository>,
    #[serde(default)]
    parameters: RawParameters,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    #[serde(default)]
    exclusions: Vec<String>,
    #[serde(default)]
    overrides: BTreeMap<String, String>,
    publication: Option<RawPublication>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParameters {
    #[serde(default)]
    conflict_strategy: ConflictStrategy,
    default_mapping: Option<String>,
    #[serde(default)]
    mediation_matcher: MatcherKind,
    #[serde(default)]
    version_comparator: VersionComparator,
}

impl RawParameters {
    fn into_parameters(self) -> Result<ResolutionParameters, ParseError> {
        Ok(ResolutionParameters {
            conflict_strategy: self.conflict_strategy,
            refresh: false,
            default_mapping: self
                .default_mapping
                .map(|mapping| mapping.parse::<ConfigurationMapping>())
                .transpose()?,
            mediation_matcher: self.mediation_matcher,
            version_comparator: self.version_comparator,
        })
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum RawLayout {
    Maven,
    Ivy,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRepository {
    url: String,
    credentials: Option<Credentials>,
    /// Header name to value, sent with every request to the repository.
    #[serde(default)]
    headers: BTreeMap<String, String>,
    layout: Option<RawLayout>,
    artifact_pattern: Option<String>,
    ivy_pattern: Option<String>,
    changing_pattern: Option<String>,
    version_filter: Option<String>,
    unique_snapshot: Option<bool>,
    checksums: Option<Vec<ChecksumAlgorithm>>,
    #[serde(default)]
    signature_required: bool,
}

impl RawRepository {
    fn into_repository(self) -> Result<Repository, ParseError> {
        let mut repository = Repository::new(&self.url)?;
        if let Some(credentials) = self.credentials {
            repository = repository.with_credentials(credentials);
        }
        if !self.headers.is_empty() {
            let prefix = repository.url().to_string();
            repository = repository.with_headers(&prefix, self.headers);
        }
        if self.layout == Some(RawLayout::Ivy)
            || self.artifact_pattern.is_some()
            || self.ivy_pattern.is_some()
        {
            repository = repository.with_layout(Layout::Ivy {
                artifact_pattern: self
                    .artifact_pattern
                    .unwrap_or_else(|| DEFAULT_IVY_ARTIFACT_PATTERN.to_string()),
                ivy_pattern: self
                    .ivy_pattern
                    .unwrap_or_else(|| DEFAULT_IVY_DESCRIPTOR_PATTERN.to_string()),
            });
        }
        if let Some(pattern) = &self.changing_pattern {
            repository = repository.with_changing_pattern(pattern)?;
        }

        let defaults = PublishConfig::default();
        let version_filter = match self.version_filter.as_deref() {
            None | Some("all") => VersionFilter::All,
            Some("releases") => VersionFilter::Releases,
            Some("snapshots") => VersionFilter::Snapshots,
            Some(pattern) => VersionFilter::matching(pattern)?,
        };
        Ok(repository.with_publish_config(PublishConfig {
            version_filter,
            unique_snapshot: self.unique_snapshot.unwrap_or(defaults.unique_snapshot),
            checksums: self.checksums.unwrap_or(defaults.checksums),
            signature_required: self.signature_required,
        }))
    }
}

/// A dependency given either as a coordinate string or as a table.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Coordinate(String),
    Detailed(RawDetailedDependency),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDetailedDependency {
    coordinate: String,
    classifier: Option<String>,
    extension: Option<String>,
    transitive: Option<Transitivity>,
    #[serde(default)]
    scopes: Vec<String>,
    mapping: Option<String>,
    #[serde(default)]
    exclusions: Vec<String>,
}

impl RawDependency {
    fn into_dependency(self) -> Result<ModuleDependency, ParseError> {
        let raw = match self {
            RawDependency::Coordinate(coordinate) => return coordinate.parse(),
            RawDependency::Detailed(raw) => raw,
        };
        let mut dependency = raw.coordinate.parse::<ModuleDependency>()?;
        if let Some(classifier) = raw.classifier {
            dependency = dependency.with_classifier(classifier);
        }
        if let Some(extension) = raw.extension {
            dependency = dependency.with_extension(extension);
        }
        if let Some(transitivity) = raw.transitive {
            dependency = dependency.with_transitivity(transitivity);
        }
        for scope in raw.scopes {
            dependency = dependency.with_scope(scope);
        }
        if let Some(mapping) = raw.mapping {
            dependency = dependency.with_mapping(mapping.parse()?);
        }
        for exclusion in raw.exclusions {
            dependency = dependency.excluding(exclusion.parse::<Exclusion>()?);
        }
        Ok(dependency)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPublication {
    #[serde(default)]
    main: Vec<RawArtifact>,
    #[serde(default)]
    classified: Vec<RawArtifact>,
    name: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(default)]
    licenses: Vec<RawLicense>,
    #[serde(default)]
    developers: Vec<RawDeveloper>,
    scm: Option<RawScm>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawArtifact {
    file: PathBuf,
    name: Option<String>,
    extension: Option<String>,
    classifier: Option<String>,
    #[serde(rename = "type")]
    artifact_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLicense {
    name: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDeveloper {
    name: String,
    email: Option<String>,
    organization: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawScm {
    url: Option<String>,
    connection: Option<String>,
    developer_connection: Option<String>,
}

impl RawArtifact {
    fn into_artifact(self, module: &VersionedModule, root: &Path) -> PublishArtifact {
        let extension = self.extension.unwrap_or_else(|| {
            self.file
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| "jar".to_string())
        });
        let mut artifact = DependencyArtifact::new(
            self.name
                .unwrap_or_else(|| module.module_id().name().to_string()),
            extension,
        )
        .with_classifier(self.classifier);
        if let Some(artifact_type) = self.artifact_type {
            artifact = artifact.with_type(artifact_type);
        }
        PublishArtifact::new(artifact, root.join(self.file))
    }
}

impl RawPublication {
    fn into_publication(self, module: &VersionedModule, root: &Path) -> Publication {
        Publication {
            main_artifacts: self
                .main
                .into_iter()
                .map(|a| a.into_artifact(module, root))
                .collect(),
            classified_artifacts: self
                .classified
                .into_iter()
                .map(|a| a.into_artifact(module, root))
                .collect(),
            descriptor_extras: PomExtras {
                name: self.name,
                description: self.description,
                url: self.url,
                licenses: self
                    .licenses
                    .into_iter()
                    .map(|l| License {
                        name: l.name,
                        url: l.url,
                    })
                    .collect(),
                developers: self
                    .developers
                    .into_iter()
                    .map(|d| Developer {
                        name: d.name,
                        email: d.email,
                        organization: d.organization,
                    })
                    .collect(),
                scm: self.scm.map(|s| Scm {
                    url: s.url,
                    connection: s.connection,
                    developer_connection: s.developer_connection,
                }),
            },
        }
    }
}
