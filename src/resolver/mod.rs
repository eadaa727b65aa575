mod chain;
mod conflict;
mod walk;

use std::path::PathBuf;

use log::{debug, info};
use thiserror::Error;

use crate::{
    cache::{CacheError, ResolutionCache},
    descriptor::{build_descriptor, DependencyArtifact, MatcherKind, ModuleDescriptor},
    model::{DependencySet, ModuleId, Version, VersionComparator, VersionedModule},
    report::{ErrorReport, ResolveResult},
    repository::{HttpSettings, RepoSet, TransportError},
    scope::ConfigurationMapping,
    tree::build_tree,
};

pub use chain::RepositoryChain;
pub use conflict::{ConflictStrategy, Selection, VersionRequest};

#[cfg(test)]
use mockall::{predicate::*, *};

/// Where the resolver finds modules: their descriptors, their versions and their files.
#[cfg_attr(test, automock)]
pub trait ModuleSource {
    /// The descriptor of a module, `None` when no repository has it.
    fn descriptor(&self, module: &VersionedModule) -> anyhow::Result<Option<ModuleDescriptor>>;

    /// Every version of a module available anywhere, in no particular order.
    fn list_versions(&self, module_id: &ModuleId) -> anyhow::Result<Vec<Version>>;

    /// Local path of an artifact of a module, downloading it when needed.
    fn artifact(
        &self,
        module: &VersionedModule,
        artifact: &DependencyArtifact,
    ) -> anyhow::Result<PathBuf>;
}

#[derive(Debug, Clone, Default)]
pub struct ResolutionParameters {
    pub conflict_strategy: ConflictStrategy,
    /// Download everything again instead of using cached files.
    pub refresh: bool,
    /// Mapping of dependencies declared without a scope.
    pub default_mapping: Option<ConfigurationMapping>,
    pub mediation_matcher: MatcherKind,
    pub version_comparator: VersionComparator,
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No repositories are configured")]
    NoRepositories,
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Repository error: {0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Dependencies(ErrorReport),
}

/// Resolves `dependencies` of `module` against `repositories`.
///
/// Without a module an anonymous one is made up. Its resolution is not recorded and
/// its cache entries are deleted afterwards.
pub fn resolve(
    module: Option<&VersionedModule>,
    dependencies: &DependencySet,
    parameters: &ResolutionParameters,
    repositories: &RepoSet,
    cache: &ResolutionCache,
    http: &HttpSettings,
) -> Result<ResolveResult, ResolveError> {
    if repositories.is_empty() {
        return Err(ResolveError::NoRepositories);
    }
    let root = module
        .cloned()
        .unwrap_or_else(VersionedModule::anonymous);
    let descriptor = build_descriptor(&root, dependencies, parameters);
    let chain = RepositoryChain::new(repositories, cache, parameters.refresh, http)?;

    let result = resolve_descriptor(&descriptor, parameters, &chain);

    if root.is_anonymous() {
        debug!("Removing cache entries of anonymous module {}", root);
        cache.purge(&root)?;
    } else {
        cache.save_resolution(&descriptor, &result.tree.resolved_versions())?;
    }
    Ok(result)
}

/// Resolves the dependencies of an already built root descriptor.
pub fn resolve_descriptor(
    root: &ModuleDescriptor,
    parameters: &ResolutionParameters,
    source: &dyn ModuleSource,
) -> ResolveResult {
    info!("Resolving dependencies of {}", root.id);
    let walked = walk::walk(root, source, parameters);
    let tree = build_tree(&walked.nodes, &root.id, &walked.artifacts);
    let report = ErrorReport::from_nodes(&walked.nodes);
    if !report.is_fine() {
        debug!("{}", report);
    }
    ResolveResult { tree, report }
}


#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::{
        model::ModuleDependency,
        repository::Repository,
    };

    fn write(root: &std::path::Path, path: &str, content: &str) {
        let path = root.join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn local_repository(root: &std::path::Path) -> RepoSet {
        write(
            root,
            "org/lib/core/1.0/core-1.0.pom",
            r#"<project>
  <groupId>org.lib</groupId>
  <artifactId>core</artifactId>
  <version>1.0</version>
</project>"#,
        );
        write(root, "org/lib/core/1.0/core-1.0.jar", "jar");
        RepoSet::new().and(Repository::new(root.to_str().unwrap()).unwrap())
    }

    #[test]
    fn anonymous_resolution_leaves_no_cache_entry() {
        let repository = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::new(cache_dir.path().to_path_buf()).unwrap();
        let dependencies =
            DependencySet::new().and("org.lib:core:1.0".parse::<ModuleDependency>().unwrap());

        let result = resolve(
            None,
            &dependencies,
            &ResolutionParameters::default(),
            &local_repository(repository.path()),
            &cache,
            &HttpSettings::default(),
        )
        .unwrap()
        .assert_no_error()
        .unwrap();

        assert_eq!(result.files().len(), 1);
        assert!(result.files()[0].ends_with("core-1.0.jar"));
        assert!(!cache_dir.path().join("resolutions").exists());
        assert!(!cache_dir
            .path()
            .join("modules")
            .join("anonymousGroup")
            .join("anonymousName")
            .read_dir()
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false));
    }

    #[test]
    fn named_resolution_is_recorded() {
        let repository = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::new(cache_dir.path().to_path_buf()).unwrap();
        let module: VersionedModule = "com.acme:app:2.0".parse().unwrap();
        let dependencies =
            DependencySet::new().and("org.lib:core:1.0".parse::<ModuleDependency>().unwrap());

        resolve(
            Some(&module),
            &dependencies,
            &ResolutionParameters::default(),
            &local_repository(repository.path()),
            &cache,
            &HttpSettings::default(),
        )
        .unwrap();

        let (descriptor_file, properties_file) = cache.resolution_files(&module);
        assert!(descriptor_file.ends_with("resolved-com.acme-app-2.0.xml"));
        assert!(descriptor_file.is_file());
        assert_eq!(
            std::fs::read_to_string(properties_file).unwrap(),
            "org.lib#core=1.0\n"
        );
    }

    #[test]
    fn no_repositories() {
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::new(cache_dir.path().to_path_buf()).unwrap();
        let result = resolve(
            None,
            &DependencySet::new(),
            &ResolutionParameters::default(),
            &RepoSet::new(),
            &cache,
            &HttpSettings::default(),
        );
        assert!(matches!(result, Err(ResolveError::NoRepositories)));
    }

    #[test]
    fn source_failures_become_problems() {
        let mut source = MockModuleSource::new();
        source
            .expect_descriptor()
            .with(eq("org.lib:core:1.0".parse::<VersionedModule>().unwrap()))
            .returning(|_| Err(anyhow::anyhow!("connection reset")));
        let root = build_descriptor(
            &"com.acme:app:1.0".parse().unwrap(),
            &DependencySet::new().and("org.lib:core:1.0".parse().unwrap()),
            &ResolutionParameters::default(),
        );

        let result = resolve_descriptor(&root, &ResolutionParameters::default(), &source);
        assert_eq!(
            result.report.to_string(),
            "Error with dependencies:\n    org.lib:core:1.0: connection reset"
        );
        assert!(matches!(
            result.assert_no_error(),
            Err(ResolveError::Dependencies(_))
        ));
    }
}
