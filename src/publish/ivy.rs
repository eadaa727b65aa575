use log::info;

use crate::{
    descriptor::{build_descriptor, PublishedArtifact},
    format::ivy::write_ivy,
    publish::{load, PublishError, Publisher},
    repository::{Repository, Transport},
    scope,
};

impl Publisher<'_> {
    /// Deploys the artifacts and the Ivy file of the module to one Ivy repository.
    /// Existing files are overwritten and no metadata is maintained.
    pub(super) fn publish_ivy_to(
        &self,
        repository: &Repository,
        transport: &dyn Transport,
    ) -> Result<(), PublishError> {
        let artifacts = self
            .publication
            .artifacts()
            .map(load)
            .collect::<Result<Vec<_>, _>>()?;
        let mut descriptor = build_descriptor(self.module, self.dependencies, &self.parameters);
        descriptor
            .artifacts
            .extend(artifacts.iter().map(|loaded| PublishedArtifact {
                artifact: loaded.artifact.clone(),
                confs: vec![scope::ALL.to_string()],
            }));
        let ivy = write_ivy(&descriptor)?;
        let layout = repository.layout();
        let version = self.module.version().as_str();

        info!("Publishing {} to {}", self.module, repository);
        self.transaction(transport, || {
            for artifact in &artifacts {
                let path = layout.artifact_path(self.module, artifact.artifact, version);
                self.upload(repository, transport, &path, &artifact.content, true, true)?;
            }
            self.upload(
                repository,
                transport,
                &layout.descriptor_path(self.module),
                ivy.as_bytes(),
                true,
                true,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{
        format::ivy::parse_ivy,
        model::{DependencySet, ModuleDependency, VersionedModule},
        publish::{publish_ivy, testing},
        repository::{HttpSettings, Layout, RepoSet},
        resolver::ResolutionParameters,
    };

    use super::*;

    #[test]
    fn publish_to_ivy_layout() {
        let dir = tempfile::tempdir().unwrap();
        let repository_dir = tempfile::tempdir().unwrap();
        let publication = testing::publication(dir.path());
        let module: VersionedModule = "org.lib:core:1.0".parse().unwrap();
        let dependencies =
            DependencySet::new().and("org.dep:util:2.0".parse::<ModuleDependency>().unwrap());
        let repositories = RepoSet::new()
            .and(
                Repository::new(repository_dir.path().to_str().unwrap())
                    .unwrap()
                    .with_layout(Layout::ivy()),
            )
            .and(Repository::new(dir.path().join("maven").to_str().unwrap()).unwrap());

        for _ in 0..2 {
            let published = publish_ivy(
                &module,
                &publication,
                &dependencies,
                &ResolutionParameters::default(),
                &repositories,
                None,
                &HttpSettings::default(),
            )
            .unwrap();
            assert_eq!(published, 1);
        }

        let root = repository_dir.path().join("org.lib/core");
        assert_eq!(std::fs::read(root.join("jars/core-1.0.jar")).unwrap(), b"main");
        assert!(root.join("jars/core-1.0-sources.jar").is_file());
        assert!(root.join("jars/core-1.0.jar.sha1").is_file());
        assert!(!root.join("maven-metadata.xml").exists());
        assert!(!dir.path().join("maven").exists());

        let descriptor = parse_ivy(&std::fs::read(root.join("ivys/ivy-1.0.xml")).unwrap()).unwrap();
        assert_eq!(descriptor.id, module);
        assert_eq!(descriptor.artifacts.len(), 2);
        assert_eq!(descriptor.dependencies.len(), 1);
        assert_eq!(descriptor.dependencies[0].module.to_string(), "org.dep:util");
    }
}
