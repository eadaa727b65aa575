use std::collections::BTreeSet;

use log::warn;
use regex_lite::Regex;
use serde::Deserialize;

use crate::{
    model::{
        DependencySet, Exclusion, ModuleDependency, ModuleId, Version, VersionedModule,
    },
    resolver::{ConflictStrategy, ResolutionParameters},
    scope::{self, ConfigurationMapping, TargetConf},
};

pub const DEFAULT_ARTIFACT_TYPE: &str = "jar";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub name: String,
    pub extends: Vec<String>,
    pub public: bool,
    pub transitive: bool,
    pub description: Option<String>,
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Configuration {
            name: name.into(),
            extends: Vec::new(),
            public: true,
            transitive: true,
            description: None,
        }
    }

    pub fn extending<'a>(mut self, parents: impl IntoIterator<Item = &'a str>) -> Self {
        self.extends.extend(parents.into_iter().map(str::to_string));
        self
    }

    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A file of a module: `name[-classifier].extension`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyArtifact {
    pub name: String,
    pub artifact_type: String,
    pub extension: String,
    pub classifier: Option<String>,
}

impl DependencyArtifact {
    pub fn new(name: impl Into<String>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        DependencyArtifact {
            name: name.into(),
            artifact_type: extension.clone(),
            extension,
            classifier: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Option<String>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = artifact_type.into();
        self
    }

    pub fn file_name(&self, version: &str) -> String {
        match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.name, version, classifier, self.extension
            ),
            None => format!("{}-{}.{}", self.name, version, self.extension),
        }
    }
}

/// An artifact a module publishes, with the configurations it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifact {
    pub artifact: DependencyArtifact,
    pub confs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludeRule {
    pub exclusion: Exclusion,
    /// Configurations of the module declaring the rule it applies in. Empty means all.
    pub confs: BTreeSet<String>,
}

impl ExcludeRule {
    pub fn everywhere(exclusion: Exclusion) -> Self {
        ExcludeRule {
            exclusion,
            confs: BTreeSet::new(),
        }
    }

    pub fn applies_in(&self, conf: &str) -> bool {
        self.confs.is_empty() || self.confs.contains(conf) || self.confs.contains(scope::ALL)
    }

    pub fn excludes_module(&self, module_id: &ModuleId) -> bool {
        self.exclusion.is_module_wide() && self.exclusion.matches_module(module_id)
    }

    pub fn excludes_artifact(&self, module_id: &ModuleId, artifact: &DependencyArtifact) -> bool {
        if !self.exclusion.matches_module(module_id) {
            return false;
        }
        let classifier_matches = match &self.exclusion.classifier {
            Some(classifier) => artifact.classifier.as_ref() == Some(classifier),
            None => true,
        };
        let type_matches = match &self.exclusion.artifact_type {
            Some(artifact_type) => {
                &artifact.artifact_type == artifact_type || &artifact.extension == artifact_type
            }
            None => true,
        };
        classifier_matches && type_matches
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherKind {
    #[default]
    Exact,
    Regex,
}

/// Imposes a version on every transitive dependency matching a module pattern.
#[derive(Debug, Clone)]
pub struct VersionMediator {
    module: ModuleId,
    version: Version,
    pattern: Option<(Regex, Regex)>,
}

impl VersionMediator {
    pub fn new(module: ModuleId, version: Version, matcher: MatcherKind) -> Self {
        let pattern = match matcher {
            MatcherKind::Exact => None,
            MatcherKind::Regex => {
                let compiled = Regex::new(&format!("^(?:{})$", module.group())).and_then(|g| {
                    Regex::new(&format!("^(?:{})$", module.name())).map(|n| (g, n))
                });
                match compiled {
                    Ok(pattern) => Some(pattern),
                    Err(error) => {
                        warn!(
                            "Version override {} is not a valid pattern ({}), matching it exactly",
                            module, error
                        );
                        None
                    }
                }
            }
        };
        VersionMediator {
            module,
            version,
            pattern,
        }
    }

    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn matcher(&self) -> MatcherKind {
        if self.pattern.is_some() {
            MatcherKind::Regex
        } else {
            MatcherKind::Exact
        }
    }

    pub fn matches(&self, module_id: &ModuleId) -> bool {
        match &self.pattern {
            Some((group, name)) => {
                group.is_match(module_id.group()) && name.is_match(module_id.name())
            }
            None => &self.module == module_id,
        }
    }
}

impl PartialEq for VersionMediator {
    fn eq(&self, other: &Self) -> bool {
        self.module == other.module
            && self.version == other.version
            && self.matcher() == other.matcher()
    }
}

/// How a module depends on another one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDescriptor {
    pub module: ModuleId,
    pub revision: Version,
    pub force: bool,
    pub changing: bool,
    pub transitive: bool,
    pub mapping: ConfigurationMapping,
    pub artifacts: Vec<DependencyArtifact>,
    pub excludes: Vec<ExcludeRule>,
}

impl DependencyDescriptor {
    pub fn new(module: ModuleId, revision: Version) -> Self {
        DependencyDescriptor {
            force: !revision.is_dynamic(),
            changing: revision.is_dynamic() || revision.is_snapshot(),
            module,
            revision,
            transitive: true,
            mapping: ConfigurationMapping::new(),
            artifacts: Vec::new(),
            excludes: Vec::new(),
        }
    }

    pub fn versioned(&self) -> VersionedModule {
        self.module.with_version(self.revision.clone())
    }

    /// Folds a second declaration of the same module into this one.
    pub fn merge(&mut self, other: DependencyDescriptor) {
        if other.revision != self.revision {
            warn!(
                "{} is declared with versions {} and {}, keeping {}",
                self.module, self.revision, other.revision, self.revision
            );
        }
        self.transitive = self.transitive && other.transitive;
        self.mapping.merge(&other.mapping);
        for artifact in other.artifacts {
            if !self.artifacts.contains(&artifact) {
                self.artifacts.push(artifact);
            }
        }
        for exclude in other.excludes {
            if !self.excludes.contains(&exclude) {
                self.excludes.push(exclude);
            }
        }
    }
}

/// A module as the resolver sees it: configurations, dependencies and published artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDescriptor {
    pub id: VersionedModule,
    pub status: String,
    pub configurations: Vec<Configuration>,
    pub dependencies: Vec<DependencyDescriptor>,
    pub artifacts: Vec<PublishedArtifact>,
    pub exclude_rules: Vec<ExcludeRule>,
    pub mediators: Vec<VersionMediator>,
    pub conflict_manager: Option<ConflictStrategy>,
}

impl ModuleDescriptor {
    pub fn new(id: VersionedModule) -> Self {
        let status = if id.version().is_snapshot() {
            "integration"
        } else {
            "release"
        };
        ModuleDescriptor {
            id,
            status: status.to_string(),
            configurations: Vec::new(),
            dependencies: Vec::new(),
            artifacts: Vec::new(),
            exclude_rules: Vec::new(),
            mediators: Vec::new(),
            conflict_manager: None,
        }
    }

    pub fn configuration(&self, name: &str) -> Option<&Configuration> {
        self.configurations.iter().find(|c| c.name == name)
    }

    pub fn add_configuration(&mut self, configuration: Configuration) {
        if self.configuration(&configuration.name).is_none() {
            self.configurations.push(configuration);
        }
    }

    pub fn dependency(&self, module_id: &ModuleId) -> Option<&DependencyDescriptor> {
        self.dependencies.iter().find(|d| &d.module == module_id)
    }

    /// Adds a dependency, merging it into an existing declaration of the same module.
    pub fn add_dependency(&mut self, dependency: DependencyDescriptor) {
        match self
            .dependencies
            .iter_mut()
            .find(|d| d.module == dependency.module)
        {
            Some(existing) => existing.merge(dependency),
            None => self.dependencies.push(dependency),
        }
    }

    fn has_public(&self, name: &str) -> bool {
        self.configuration(name).is_some_and(|c| c.public)
    }

    fn public_names(&self) -> Vec<String> {
        self.configurations
            .iter()
            .filter(|c| c.public)
            .map(|c| c.name.clone())
            .collect()
    }

    /// The public configurations satisfying a requested target, applying its fallback.
    pub fn resolve_target(&self, target: &TargetConf) -> Vec<String> {
        if target.name == scope::ALL {
            return self.public_names();
        }
        if self.has_public(&target.name) {
            return vec![target.name.clone()];
        }
        match target.fallback.as_deref() {
            Some(scope::ALL) => self.public_names(),
            Some(fallback) if self.has_public(fallback) => vec![fallback.to_string()],
            _ => Vec::new(),
        }
    }

    /// The given configurations together with everything they extend.
    pub fn expand_configurations<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> BTreeSet<String> {
        let mut expanded = BTreeSet::new();
        let mut pending = names.into_iter().map(str::to_string).collect::<Vec<_>>();
        while let Some(name) = pending.pop() {
            if expanded.insert(name.clone()) {
                if let Some(configuration) = self.configuration(&name) {
                    pending.extend(configuration.extends.iter().cloned());
                }
            }
        }
        expanded
    }

    pub fn mediated_version(&self, module_id: &ModuleId) -> Option<&Version> {
        self.mediators
            .iter()
            .find(|mediator| mediator.matches(module_id))
            .map(VersionMediator::version)
    }
}

/// Builds the descriptor of `module` declaring `dependencies`. Pure, performs no I/O.
pub fn build_descriptor(
    module: &VersionedModule,
    dependencies: &DependencySet,
    parameters: &ResolutionParameters,
) -> ModuleDescriptor {
    let mut descriptor = ModuleDescriptor::new(module.clone());

    let mut masters = Vec::new();
    for dependency in &dependencies.dependencies {
        let mapping = scope::dependency_mapping(dependency, parameters.default_mapping.as_ref());
        masters.extend(
            mapping
                .masters()
                .filter(|master| *master != scope::ALL)
                .map(str::to_string),
        );
        descriptor.add_dependency(dependency_descriptor(dependency, mapping));
    }

    let configurations = scope::involved_scopes(masters.iter().map(String::as_str));
    if configurations.is_empty() {
        descriptor.add_configuration(Configuration::new(scope::DEFAULT));
    }
    for name in &configurations {
        let parents = scope::scope_parents(name)
            .iter()
            .copied()
            .filter(|parent| configurations.contains(*parent));
        descriptor.add_configuration(Configuration::new(name.as_str()).extending(parents));
    }

    descriptor.exclude_rules.extend(
        dependencies
            .global_exclusions
            .iter()
            .cloned()
            .map(ExcludeRule::everywhere),
    );

    descriptor.mediators.extend(
        dependencies
            .version_provider
            .iter()
            .map(|(module_id, version)| {
                VersionMediator::new(
                    module_id.clone(),
                    version.clone(),
                    parameters.mediation_matcher,
                )
            }),
    );

    descriptor.conflict_manager = parameters.conflict_strategy.bound();
    descriptor
}

fn dependency_descriptor(
    dependency: &ModuleDependency,
    mapping: ConfigurationMapping,
) -> DependencyDescriptor {
    let mut descriptor =
        DependencyDescriptor::new(dependency.module_id().clone(), dependency.version().clone());
    descriptor.transitive = dependency.is_transitive();

    if dependency.classifier.is_some() || dependency.extension.is_some() {
        let extension = dependency
            .extension
            .as_deref()
            .unwrap_or(DEFAULT_ARTIFACT_TYPE);
        descriptor.artifacts.push(
            DependencyArtifact::new(dependency.module_id().name(), extension)
                .with_classifier(dependency.classifier.clone()),
        );
    }

    let masters = mapping.masters().map(str::to_string).collect::<BTreeSet<_>>();
    descriptor.excludes = dependency
        .exclusions
        .iter()
        .map(|exclusion| ExcludeRule {
            exclusion: exclusion.clone(),
            confs: masters.clone(),
        })
        .collect();
    descriptor.mapping = mapping;
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::model::{Transitivity, VersionProvider};

    fn dependency(coordinate: &str) -> ModuleDependency {
        coordinate.parse().unwrap()
    }

    fn module() -> VersionedModule {
        "com.acme:app:1.0".parse().unwrap()
    }

    #[test]
    fn duplicate_declarations_are_merged() {
        let set = DependencySet::new()
            .and(dependency("org.lib:core:1.0").with_scope("compile"))
            .and(
                dependency("org.lib:core:1.0")
                    .with_scope("runtime")
                    .with_transitivity(Transitivity::None),
            );
        let descriptor = build_descriptor(&module(), &set, &ResolutionParameters::default());

        assert_eq!(descriptor.dependencies.len(), 1);
        let core = &descriptor.dependencies[0];
        assert!(!core.transitive);
        assert_eq!(
            core.mapping.to_string(),
            "compile->compile(default);runtime->archives(master)"
        );
    }

    #[test]
    fn transitive_only_when_all_declarations_are() {
        let set = DependencySet::new()
            .and(dependency("org.lib:core:1.0"))
            .and(dependency("org.lib:core:1.0"));
        let descriptor = build_descriptor(&module(), &set, &ResolutionParameters::default());
        assert!(descriptor.dependencies[0].transitive);
    }

    #[test]
    fn configurations_follow_declared_scopes() {
        let set = DependencySet::new()
            .and(dependency("org.lib:core:1.0").with_scope("runtime"))
            .and(dependency("org.junit:junit:4.13").with_scope("test"));
        let descriptor = build_descriptor(&module(), &set, &ResolutionParameters::default());

        let names = descriptor
            .configurations
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["compile", "provided", "runtime", "test"]);
        assert_eq!(
            descriptor.configuration("test").unwrap().extends,
            vec!["runtime", "provided"]
        );
        assert_eq!(
            descriptor.expand_configurations(["test"]),
            ["compile", "provided", "runtime", "test"]
                .into_iter()
                .map(str::to_string)
                .collect()
        );
    }

    #[test]
    fn default_configuration_without_scopes() {
        let set = DependencySet::new().and(dependency("org.lib:core:1.0"));
        let descriptor = build_descriptor(&module(), &set, &ResolutionParameters::default());
        assert_eq!(descriptor.configurations, vec![Configuration::new("default")]);
        assert_eq!(
            descriptor.dependencies[0].mapping.to_string(),
            "default->archives(master),compile(default),runtime(default)"
        );
    }

    #[test]
    fn exclusions_become_rules() {
        let set = DependencySet::new()
            .and(
                dependency("org.lib:core:1.0")
                    .with_scope("compile")
                    .excluding("commons-logging:commons-logging".parse().unwrap()),
            )
            .with_global_exclusion("log4j:log4j".parse().unwrap());
        let descriptor = build_descriptor(&module(), &set, &ResolutionParameters::default());

        let rule = &descriptor.dependencies[0].excludes[0];
        assert_eq!(rule.confs, BTreeSet::from(["compile".to_string()]));
        assert!(rule.applies_in("compile"));
        assert!(!rule.applies_in("runtime"));

        let global = &descriptor.exclude_rules[0];
        assert!(global.applies_in("runtime"));
        assert!(global.excludes_module(&"log4j:log4j".parse().unwrap()));
    }

    #[test]
    fn classifier_requests_artifact() {
        let set = DependencySet::new().and(
            dependency("org.lib:core:1.0:natives-linux").with_extension("zip"),
        );
        let descriptor = build_descriptor(&module(), &set, &ResolutionParameters::default());
        let artifact = &descriptor.dependencies[0].artifacts[0];
        assert_eq!(artifact.file_name("1.0"), "core-1.0-natives-linux.zip");
        assert!(!descriptor.dependencies[0].transitive);
    }

    #[test]
    fn dynamic_versions_are_not_forced() {
        let set = DependencySet::new()
            .and(dependency("org.lib:core:1.+"))
            .and(dependency("org.lib:util:1.0"))
            .and(dependency("org.lib:snap:1.0-SNAPSHOT"));
        let descriptor = build_descriptor(&module(), &set, &ResolutionParameters::default());
        let flags = descriptor
            .dependencies
            .iter()
            .map(|d| (d.force, d.changing))
            .collect::<Vec<_>>();
        assert_eq!(flags, vec![(false, true), (true, false), (true, true)]);
    }

    #[test]
    fn version_overrides_become_mediators() {
        let provider = VersionProvider::new()
            .with("org.lib:core".parse().unwrap(), Version::new("2.0").unwrap());
        let set = DependencySet::new().with_version_provider(provider);
        let descriptor = build_descriptor(&module(), &set, &ResolutionParameters::default());
        assert_eq!(
            descriptor
                .mediated_version(&"org.lib:core".parse().unwrap())
                .map(Version::as_str),
            Some("2.0")
        );
        assert_eq!(
            descriptor.mediated_version(&"org.lib:core-extra".parse().unwrap()),
            None
        );
    }

    #[test]
    fn regex_mediators_on_request() {
        let provider = VersionProvider::new()
            .with("org.lib:core.*".parse().unwrap(), Version::new("2.0").unwrap());
        let set = DependencySet::new().with_version_provider(provider);
        let parameters = ResolutionParameters {
            mediation_matcher: MatcherKind::Regex,
            ..ResolutionParameters::default()
        };
        let descriptor = build_descriptor(&module(), &set, &parameters);
        assert!(descriptor
            .mediated_version(&"org.lib:core-extra".parse().unwrap())
            .is_some());
    }

    #[test]
    fn conflict_manager_binding() {
        let set = DependencySet::new();
        let unbound = build_descriptor(&module(), &set, &ResolutionParameters::default());
        assert_eq!(unbound.conflict_manager, None);

        let parameters = ResolutionParameters {
            conflict_strategy: ConflictStrategy::Strict,
            ..ResolutionParameters::default()
        };
        let bound = build_descriptor(&module(), &set, &parameters);
        assert_eq!(bound.conflict_manager, Some(ConflictStrategy::Strict));
    }

    #[test]
    fn resolve_target_with_fallback() {
        let mut descriptor = ModuleDescriptor::new(module());
        descriptor.add_configuration(Configuration::new("default"));
        descriptor.add_configuration(Configuration::new("master"));
        descriptor.add_configuration(Configuration::new("test").private());

        assert_eq!(
            descriptor.resolve_target(&TargetConf::new("archives").with_fallback("master")),
            vec!["master"]
        );
        assert_eq!(
            descriptor.resolve_target(&TargetConf::new("test").with_fallback("default")),
            vec!["default"]
        );
        assert_eq!(
            descriptor.resolve_target(&TargetConf::new("compile").with_fallback("*")),
            vec!["default", "master"]
        );
        assert!(descriptor
            .resolve_target(&TargetConf::new("compile"))
            .is_empty());
    }
}
