use log::{debug, info};

use crate::{
    descriptor::DependencyArtifact,
    format::{
        metadata::MavenMetadata,
        pom::{write_pom, POM_EXTENSION},
    },
    publish::{load, PublishError, Publisher},
    repository::{Repository, Transport},
};

const SNAPSHOT_TIMESTAMP: &str = "%Y%m%d.%H%M%S";
const UPDATED_TIMESTAMP: &str = "%Y%m%d%H%M%S";

impl Publisher<'_> {
    /// Deploys the artifacts, the POM and the metadata files of the module to one
    /// Maven repository, all inside one transaction.
    pub(super) fn publish_maven(
        &self,
        repository: &Repository,
        transport: &dyn Transport,
    ) -> Result<(), PublishError> {
        let artifacts = self
            .publication
            .artifacts()
            .map(load)
            .collect::<Result<Vec<_>, _>>()?;
        let pom = write_pom(
            self.module,
            self.publication.packaging(),
            self.dependencies,
            &self.publication.descriptor_extras,
        )?;
        let layout = repository.layout();
        let config = repository.publish_config();
        let version = self.module.version();
        let snapshot = version.is_snapshot();
        let pom_artifact = DependencyArtifact::new(self.module.module_id().name(), POM_EXTENSION);

        info!("Publishing {} to {}", self.module, repository);
        self.transaction(transport, || {
            if !snapshot {
                let paths = artifacts
                    .iter()
                    .map(|a| layout.artifact_path(self.module, a.artifact, version.as_str()))
                    .chain(std::iter::once(layout.descriptor_path(self.module)));
                for path in paths {
                    if transport.exists(&path)? {
                        debug!("{} already exists", path);
                        return Err(PublishError::AlreadyPublished(
                            self.module.to_string(),
                            repository.to_string(),
                        ));
                    }
                }
            }

            let mut snapshot_metadata = None;
            let file_version = if snapshot && config.unique_snapshot {
                let metadata_path = layout.version_metadata_path(self.module);
                let mut metadata = match transport.get(&metadata_path)? {
                    Some(content) => MavenMetadata::parse(&content)?,
                    None => MavenMetadata::for_version(self.module),
                };
                let timestamp = self.now.format(SNAPSHOT_TIMESTAMP).to_string();
                let build = metadata.update_snapshot(&timestamp)?;
                debug!("Deploying snapshot build {} of {}", build, self.module);
                let file_version = format!("{}-{}-{}", version.base(), timestamp, build);
                snapshot_metadata = Some((metadata_path, metadata));
                file_version
            } else {
                version.to_string()
            };

            for artifact in &artifacts {
                let path = layout.artifact_path(self.module, artifact.artifact, &file_version);
                self.upload(
                    repository,
                    transport,
                    &path,
                    &artifact.content,
                    snapshot,
                    true,
                )?;
            }
            let pom_path = layout.artifact_path(self.module, &pom_artifact, &file_version);
            self.upload(
                repository,
                transport,
                &pom_path,
                pom.as_bytes(),
                snapshot,
                true,
            )?;

            // Snapshot entries only name files that are already uploaded.
            if let Some((metadata_path, mut metadata)) = snapshot_metadata {
                let updated = self.now.format(UPDATED_TIMESTAMP).to_string();
                for artifact in artifacts.iter().map(|a| a.artifact).chain([&pom_artifact]) {
                    metadata.add_snapshot_version(
                        &artifact.extension,
                        artifact.classifier.as_deref(),
                        &file_version,
                        &updated,
                    );
                }
                self.upload(
                    repository,
                    transport,
                    &metadata_path,
                    metadata.to_xml()?.as_bytes(),
                    true,
                    false,
                )?;
            }

            let metadata_path = layout.module_metadata_path(self.module.module_id());
            let mut metadata = match transport.get(&metadata_path)? {
                Some(content) => MavenMetadata::parse(&content)?,
                None => MavenMetadata::for_module(self.module.module_id()),
            };
            metadata.add_version(
                version,
                &self.now.format(UPDATED_TIMESTAMP).to_string(),
                self.comparator,
            );
            self.upload(
                repository,
                transport,
                &metadata_path,
                metadata.to_xml()?.as_bytes(),
                true,
                false,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use crate::{
        model::{DependencySet, VersionedModule},
        publish::testing,
        repository::{transport::MockTransport, HttpSettings, RepoSet, TransportError},
    };

    use super::*;

    fn repository(dir: &std::path::Path) -> Repository {
        Repository::new(dir.to_str().unwrap()).unwrap()
    }

    #[test]
    fn refuse_existing_release() {
        let dir = tempfile::tempdir().unwrap();
        let publication = testing::publication(dir.path());
        let module: VersionedModule = "org.lib:core:1.0".parse().unwrap();
        let dependencies = DependencySet::new();
        let mut transport = MockTransport::new();
        transport.expect_describe().return_const("mock".to_string());
        transport
            .expect_begin_publish_transaction()
            .times(1)
            .returning(|_| Ok(()));
        transport.expect_exists().returning(|_| Ok(true));
        transport.expect_put().never();
        transport.expect_commit_publish_transaction().never();
        transport
            .expect_abort_publish_transaction()
            .times(1)
            .returning(|| Ok(()));

        let result = Publisher::new(&module, &publication, &dependencies)
            .publish_maven(&repository(dir.path()), &transport);
        assert!(matches!(result, Err(PublishError::AlreadyPublished(_, _))));
    }

    #[test]
    fn abort_after_failed_upload() {
        let dir = tempfile::tempdir().unwrap();
        let publication = testing::publication(dir.path());
        let module: VersionedModule = "org.lib:core:1.0".parse().unwrap();
        let dependencies = DependencySet::new();
        let uploaded = Arc::new(Mutex::new(Vec::new()));

        let mut transport = MockTransport::new();
        transport.expect_describe().return_const("mock".to_string());
        transport
            .expect_begin_publish_transaction()
            .times(1)
            .returning(|_| Ok(()));
        transport.expect_exists().returning(|_| Ok(false));
        let record = uploaded.clone();
        transport.expect_put().returning(move |path, _, _| {
            if path.ends_with("-sources.jar") {
                return Err(TransportError::Server(path.to_string(), 503));
            }
            record.lock().unwrap().push(path.to_string());
            Ok(())
        });
        transport.expect_commit_publish_transaction().never();
        transport
            .expect_abort_publish_transaction()
            .times(1)
            .returning(|| Ok(()));

        let result = Publisher::new(&module, &publication, &dependencies)
            .publish_maven(&repository(dir.path()), &transport);
        assert!(matches!(result, Err(PublishError::Transport(_))));
        assert_eq!(
            *uploaded.lock().unwrap(),
            vec![
                "org/lib/core/1.0/core-1.0.jar",
                "org/lib/core/1.0/core-1.0.jar.md5",
                "org/lib/core/1.0/core-1.0.jar.sha1",
            ]
        );
    }

    #[test]
    fn snapshot_metadata_is_pushed_after_files() {
        let dir = tempfile::tempdir().unwrap();
        let publication = testing::publication(dir.path());
        let module: VersionedModule = "org.lib:core:1.0-SNAPSHOT".parse().unwrap();
        let dependencies = DependencySet::new();
        let uploaded = Arc::new(Mutex::new(Vec::new()));

        let mut transport = MockTransport::new();
        transport.expect_describe().return_const("mock".to_string());
        transport
            .expect_begin_publish_transaction()
            .times(1)
            .returning(|_| Ok(()));
        transport.expect_get().returning(|_| Ok(None));
        let record = uploaded.clone();
        transport.expect_put().returning(move |path, _, _| {
            record.lock().unwrap().push(path.to_string());
            Ok(())
        });
        transport
            .expect_commit_publish_transaction()
            .times(1)
            .returning(|| Ok(()));

        let mut publisher = Publisher::new(&module, &publication, &dependencies);
        publisher.now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        publisher
            .publish_maven(&repository(dir.path()), &transport)
            .unwrap();

        let uploaded = uploaded.lock().unwrap();
        let position = |path: &str| uploaded.iter().position(|p| p == path).unwrap();
        let version_metadata = position("org/lib/core/1.0-SNAPSHOT/maven-metadata.xml");
        assert_eq!(
            uploaded[0],
            "org/lib/core/1.0-SNAPSHOT/core-1.0-20240102.030405-1.jar"
        );
        let pom = position("org/lib/core/1.0-SNAPSHOT/core-1.0-20240102.030405-1.pom");
        assert!(pom < version_metadata);
        assert!(version_metadata < position("org/lib/core/maven-metadata.xml"));
    }

    #[test]
    fn unique_snapshots_get_increasing_build_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let repository_dir = tempfile::tempdir().unwrap();
        let publication = testing::publication(dir.path());
        let module: VersionedModule = "org.lib:core:1.0-SNAPSHOT".parse().unwrap();
        let dependencies = DependencySet::new();
        let repositories = RepoSet::new().and(repository(repository_dir.path()));

        let mut publisher = Publisher::new(&module, &publication, &dependencies);
        publisher.now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            publisher
                .publish(&repositories, &HttpSettings::default())
                .unwrap(),
            1
        );
        publisher
            .publish(&repositories, &HttpSettings::default())
            .unwrap();

        let version_dir = repository_dir.path().join("org/lib/core/1.0-SNAPSHOT");
        assert!(version_dir.join("core-1.0-20240102.030405-1.jar").is_file());
        assert!(version_dir.join("core-1.0-20240102.030405-2.jar").is_file());
        assert!(version_dir
            .join("core-1.0-20240102.030405-2-sources.jar")
            .is_file());
        assert!(version_dir.join("core-1.0-20240102.030405-2.pom").is_file());

        let version_metadata =
            MavenMetadata::parse(&std::fs::read(version_dir.join("maven-metadata.xml")).unwrap())
                .unwrap();
        assert_eq!(version_metadata.build_number(), 2);
        assert_eq!(
            version_metadata.snapshot_value("jar", Some("sources")),
            Some("1.0-20240102.030405-2".to_string())
        );

        let module_metadata = MavenMetadata::parse(
            &std::fs::read(repository_dir.path().join("org/lib/core/maven-metadata.xml")).unwrap(),
        )
        .unwrap();
        assert_eq!(module_metadata.versioning.versions, vec!["1.0-SNAPSHOT"]);
        assert_eq!(
            module_metadata.versioning.latest.as_deref(),
            Some("1.0-SNAPSHOT")
        );
        assert_eq!(module_metadata.versioning.release, None);
    }

    #[test]
    fn releases_are_listed_in_module_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let repository_dir = tempfile::tempdir().unwrap();
        let publication = testing::publication(dir.path());
        let dependencies = DependencySet::new();
        let repositories = RepoSet::new().and(repository(repository_dir.path()));

        for version in ["1.0", "1.1"] {
            let module = VersionedModule::of("org.lib", "core", version).unwrap();
            Publisher::new(&module, &publication, &dependencies)
                .publish(&repositories, &HttpSettings::default())
                .unwrap();
        }

        let metadata = MavenMetadata::parse(
            &std::fs::read(repository_dir.path().join("org/lib/core/maven-metadata.xml")).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata.versioning.versions, vec!["1.0", "1.1"]);
        assert_eq!(metadata.versioning.release.as_deref(), Some("1.1"));
        let pom = std::fs::read_to_string(
            repository_dir
                .path()
                .join("org/lib/core/1.1/core-1.1.pom"),
        )
        .unwrap();
        assert!(pom.contains("<packaging>jar</packaging>"));
    }
}
