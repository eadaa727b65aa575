use std::{
    collections::{btree_map, BTreeMap, BTreeSet},
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    model::{ModuleId, ParseError, Version, VersionedModule},
    scope::ConfigurationMapping,
};

/// How far the dependencies of a dependency are followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transitivity {
    /// Only the artifact itself.
    None,
    /// The artifact and what it needs to compile against.
    Compile,
    /// The artifact and everything it needs at runtime.
    Runtime,
}

impl FromStr for Transitivity {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Ok(Transitivity::None),
            "compile" => Ok(Transitivity::Compile),
            "runtime" => Ok(Transitivity::Runtime),
            _ => Err(ParseError::InvalidTransitivity(value.to_string())),
        }
    }
}

impl Display for Transitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transitivity::None => f.write_str("none"),
            Transitivity::Compile => f.write_str("compile"),
            Transitivity::Runtime => f.write_str("runtime"),
        }
    }
}

/// Excludes a module, or some artifacts of it, from a resolution.
///
/// Group and name accept `*` as a wildcard. When neither a classifier nor a type
/// is given the whole module is excluded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Exclusion {
    pub group: String,
    pub name: String,
    pub classifier: Option<String>,
    pub artifact_type: Option<String>,
}

impl Exclusion {
    pub fn of(module_id: &ModuleId) -> Self {
        Exclusion {
            group: module_id.group().to_string(),
            name: module_id.name().to_string(),
            classifier: None,
            artifact_type: None,
        }
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    pub fn with_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = Some(artifact_type.into());
        self
    }

    pub fn is_module_wide(&self) -> bool {
        self.classifier.is_none() && self.artifact_type.is_none()
    }

    pub fn matches_module(&self, module_id: &ModuleId) -> bool {
        wildcard_eq(&self.group, module_id.group()) && wildcard_eq(&self.name, module_id.name())
    }
}

fn wildcard_eq(pattern: &str, value: &str) -> bool {
    pattern == "*" || pattern == value
}

impl FromStr for Exclusion {
    type Err = ParseError;

    /// `group:name[:classifier[:type]]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split(':');
        let mut next = |component: &str| {
            parts
                .next()
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    ParseError::MissingCoordinateComponent(component.to_string(), s.to_string())
                })
        };
        let group = next("group")?;
        let name = next("name")?;
        let classifier = next("classifier").ok().filter(|c| c != "*");
        let artifact_type = next("type").ok().filter(|t| t != "*");
        Ok(Exclusion {
            group,
            name,
            classifier,
            artifact_type,
        })
    }
}

impl Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)?;
        match (&self.classifier, &self.artifact_type) {
            (None, None) => Ok(()),
            (classifier, artifact_type) => write!(
                f,
                ":{}:{}",
                classifier.as_deref().unwrap_or("*"),
                artifact_type.as_deref().unwrap_or("*")
            ),
        }
    }
}

/// A single declared dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDependency {
    pub module: VersionedModule,
    pub classifier: Option<String>,
    pub extension: Option<String>,
    pub transitivity: Option<Transitivity>,
    pub exclusions: Vec<Exclusion>,
    pub scopes: Vec<String>,
    pub mapping: Option<ConfigurationMapping>,
}

impl ModuleDependency {
    pub fn new(module: VersionedModule) -> Self {
        ModuleDependency {
            module,
            classifier: None,
            extension: None,
            transitivity: None,
            exclusions: Vec::new(),
            scopes: Vec::new(),
            mapping: None,
        }
    }

    pub fn module_id(&self) -> &ModuleId {
        self.module.module_id()
    }

    pub fn version(&self) -> &Version {
        self.module.version()
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn with_transitivity(mut self, transitivity: Transitivity) -> Self {
        self.transitivity = Some(transitivity);
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn with_mapping(mut self, mapping: ConfigurationMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn excluding(mut self, exclusion: Exclusion) -> Self {
        self.exclusions.push(exclusion);
        self
    }

    /// Whether the dependencies of this dependency are followed. Without an explicit
    /// transitivity only the main artifact brings its dependencies along.
    pub fn is_transitive(&self) -> bool {
        match self.transitivity {
            Some(Transitivity::None) => false,
            Some(_) => true,
            None => self.classifier.is_none(),
        }
    }

    pub fn effective_transitivity(&self) -> Transitivity {
        match self.transitivity {
            Some(transitivity) => transitivity,
            None if self.is_transitive() => Transitivity::Runtime,
            None => Transitivity::None,
        }
    }
}

impl FromStr for ModuleDependency {
    type Err = ParseError;

    /// `group:name:version[:classifier]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parts = s.split(':').collect::<Vec<_>>();
        match parts.as_slice() {
            [group, name, version] => Ok(ModuleDependency::new(VersionedModule::of(
                group, name, version,
            )?)),
            [group, name, version, classifier] => Ok(ModuleDependency::new(
                VersionedModule::of(group, name, version)?,
            )
            .with_classifier(*classifier)),
            _ => Err(ParseError::MissingCoordinateComponent(
                "version".to_string(),
                s.to_string(),
            )),
        }
    }
}

/// Versions imposed on transitive dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionProvider {
    versions: BTreeMap<ModuleId, Version>,
}

impl VersionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, module_id: ModuleId, version: Version) -> Self {
        self.versions.insert(module_id, version);
        self
    }

    pub fn insert(&mut self, module_id: ModuleId, version: Version) -> Option<Version> {
        self.versions.insert(module_id, version)
    }

    pub fn get(&self, module_id: &ModuleId) -> Option<&Version> {
        self.versions.get(module_id)
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ModuleId, Version> {
        self.versions.iter()
    }
}

impl<'a> IntoIterator for &'a VersionProvider {
    type Item = (&'a ModuleId, &'a Version);
    type IntoIter = btree_map::Iter<'a, ModuleId, Version>;

    fn into_iter(self) -> Self::IntoIter {
        self.versions.iter()
    }
}

/// The declared dependencies of a module with the rules that apply to all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    pub dependencies: Vec<ModuleDependency>,
    pub global_exclusions: Vec<Exclusion>,
    pub version_provider: VersionProvider,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, dependency: ModuleDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_global_exclusion(mut self, exclusion: Exclusion) -> Self {
        self.global_exclusions.push(exclusion);
        self
    }

    pub fn with_version_provider(mut self, version_provider: VersionProvider) -> Self {
        self.version_provider = version_provider;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Scopes declared by any dependency, in declaration order.
    pub fn declared_scopes(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.dependencies
            .iter()
            .flat_map(|dependency| dependency.scopes.iter())
            .filter(|scope| seen.insert(scope.as_str()))
            .cloned()
            .collect()
    }
}
