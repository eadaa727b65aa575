use crate::{
    format::{Element, FormatError, XmlWriter},
    model::{version::SNAPSHOT_SUFFIX, ModuleId, Version, VersionComparator, VersionedModule},
};

pub const METADATA_FILE_NAME: &str = "maven-metadata.xml";
const MODEL_VERSION: &str = "1.1.0";

/// The content of a `maven-metadata.xml` file, at module or at version level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MavenMetadata {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub versioning: Versioning,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Versioning {
    pub latest: Option<String>,
    pub release: Option<String>,
    pub snapshot: Option<Snapshot>,
    pub versions: Vec<String>,
    pub last_updated: Option<String>,
    pub snapshot_versions: Vec<SnapshotVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub timestamp: String,
    pub build_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotVersion {
    pub classifier: Option<String>,
    pub extension: String,
    pub value: String,
    pub updated: String,
}

impl MavenMetadata {
    /// Empty module level metadata.
    pub fn for_module(module_id: &ModuleId) -> Self {
        MavenMetadata {
            group_id: module_id.group().to_string(),
            artifact_id: module_id.name().to_string(),
            ..MavenMetadata::default()
        }
    }

    /// Empty version level metadata.
    pub fn for_version(module: &VersionedModule) -> Self {
        MavenMetadata {
            version: Some(module.version().to_string()),
            ..MavenMetadata::for_module(module.module_id())
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let root = Element::parse(bytes)?;
        if root.name != "metadata" {
            return Err(FormatError::Missing("metadata".to_string()));
        }
        let text = |element: &Element, name: &str| element.child_text(name).map(str::to_string);

        let mut versioning = Versioning::default();
        if let Some(element) = root.child("versioning") {
            versioning.latest = text(element, "latest");
            versioning.release = text(element, "release");
            versioning.last_updated = text(element, "lastUpdated");
            versioning.versions = element
                .child("versions")
                .map(|versions| {
                    versions
                        .children("version")
                        .map(|v| v.text.trim().to_string())
                        .filter(|v| !v.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            if let Some(snapshot) = element.child("snapshot") {
                let build_number = match snapshot.child_text("buildNumber") {
                    Some(number) => number.parse::<u32>().map_err(|_| {
                        FormatError::InvalidValue("buildNumber".to_string(), number.to_string())
                    })?,
                    None => 0,
                };
                versioning.snapshot = Some(Snapshot {
                    timestamp: text(snapshot, "timestamp").unwrap_or_default(),
                    build_number,
                });
            }
            if let Some(snapshot_versions) = element.child("snapshotVersions") {
                for entry in snapshot_versions.children("snapshotVersion") {
                    versioning.snapshot_versions.push(SnapshotVersion {
                        classifier: text(entry, "classifier"),
                        extension: text(entry, "extension")
                            .ok_or_else(|| FormatError::Missing("extension".to_string()))?,
                        value: text(entry, "value")
                            .ok_or_else(|| FormatError::Missing("value".to_string()))?,
                        updated: text(entry, "updated").unwrap_or_default(),
                    });
                }
            }
        }

        Ok(MavenMetadata {
            group_id: text(&root, "groupId")
                .ok_or_else(|| FormatError::Missing("groupId".to_string()))?,
            artifact_id: text(&root, "artifactId")
                .ok_or_else(|| FormatError::Missing("artifactId".to_string()))?,
            version: text(&root, "version"),
            versioning,
        })
    }

    pub fn to_xml(&self) -> Result<String, FormatError> {
        let mut xml = XmlWriter::new()?;
        xml.start("metadata", &[("modelVersion", MODEL_VERSION)])?;
        xml.text_element("groupId", &self.group_id)?;
        xml.text_element("artifactId", &self.artifact_id)?;
        xml.optional_text_element("version", self.version.as_deref())?;

        let versioning = &self.versioning;
        xml.start("versioning", &[])?;
        xml.optional_text_element("latest", versioning.latest.as_deref())?;
        xml.optional_text_element("release", versioning.release.as_deref())?;
        if let Some(snapshot) = &versioning.snapshot {
            xml.start("snapshot", &[])?;
            xml.text_element("timestamp", &snapshot.timestamp)?;
            xml.text_element("buildNumber", &snapshot.build_number.to_string())?;
            xml.end("snapshot")?;
        }
        if !versioning.versions.is_empty() {
            xml.start("versions", &[])?;
            for version in &versioning.versions {
                xml.text_element("version", version)?;
            }
            xml.end("versions")?;
        }
        xml.optional_text_element("lastUpdated", versioning.last_updated.as_deref())?;
        if !versioning.snapshot_versions.is_empty() {
            xml.start("snapshotVersions", &[])?;
            for entry in &versioning.snapshot_versions {
                xml.start("snapshotVersion", &[])?;
                xml.optional_text_element("classifier", entry.classifier.as_deref())?;
                xml.text_element("extension", &entry.extension)?;
                xml.text_element("value", &entry.value)?;
                xml.text_element("updated", &entry.updated)?;
                xml.end("snapshotVersion")?;
            }
            xml.end("snapshotVersions")?;
        }
        xml.end("versioning")?;
        xml.end("metadata")?;
        Ok(xml.finish())
    }

    pub fn build_number(&self) -> u32 {
        self.versioning
            .snapshot
            .as_ref()
            .map_or(0, |snapshot| snapshot.build_number)
    }

    /// Starts a new unique snapshot deployment at `timestamp` (`yyyyMMdd.HHmmss`)
    /// and returns its build number.
    pub fn update_snapshot(&mut self, timestamp: &str) -> Result<u32, FormatError> {
        let build_number = self.build_number().checked_add(1).ok_or_else(|| {
            FormatError::InvalidValue("buildNumber".to_string(), self.build_number().to_string())
        })?;
        self.versioning.snapshot = Some(Snapshot {
            timestamp: timestamp.to_string(),
            build_number,
        });
        self.versioning.last_updated = Some(timestamp.replace('.', ""));
        Ok(build_number)
    }

    /// Records a deployed snapshot file, replacing the entry for the same extension and classifier.
    pub fn add_snapshot_version(
        &mut self,
        extension: &str,
        classifier: Option<&str>,
        value: &str,
        updated: &str,
    ) {
        let entry = SnapshotVersion {
            classifier: classifier.map(str::to_string),
            extension: extension.to_string(),
            value: value.to_string(),
            updated: updated.to_string(),
        };
        let existing = self
            .versioning
            .snapshot_versions
            .iter_mut()
            .find(|e| e.extension == extension && e.classifier.as_deref() == classifier);
        match existing {
            Some(existing) => *existing = entry,
            None => self.versioning.snapshot_versions.push(entry),
        }
    }

    /// The unique file version deployed for an extension and classifier. Metadata
    /// without `snapshotVersions` only records the latest timestamp and build number.
    pub fn snapshot_value(&self, extension: &str, classifier: Option<&str>) -> Option<String> {
        if self.versioning.snapshot_versions.is_empty() {
            let snapshot = self.versioning.snapshot.as_ref()?;
            let base = self.version.as_deref()?.strip_suffix(SNAPSHOT_SUFFIX)?;
            return (snapshot.build_number > 0 && !snapshot.timestamp.is_empty()).then(|| {
                format!("{}-{}-{}", base, snapshot.timestamp, snapshot.build_number)
            });
        }
        self.versioning
            .snapshot_versions
            .iter()
            .find(|e| e.extension == extension && e.classifier.as_deref() == classifier)
            .map(|e| e.value.clone())
    }

    /// Adds a version to module level metadata at `timestamp` (`yyyyMMddHHmmss`).
    /// Listed versions that do not parse are kept in front of the sorted ones.
    pub fn add_version(
        &mut self,
        version: &Version,
        timestamp: &str,
        comparator: VersionComparator,
    ) {
        let mut unparsed = Vec::new();
        let mut versions = Vec::new();
        for listed in self.versioning.versions.drain(..) {
            match Version::new(listed.as_str()) {
                Ok(parsed) => versions.push(parsed),
                Err(_) => unparsed.push(listed),
            }
        }
        if !versions.contains(version) {
            versions.push(version.clone());
        }
        comparator.sort(&mut versions);
        self.versioning.latest = versions.last().map(Version::to_string);
        if !version.is_snapshot() {
            self.versioning.release = versions
                .iter()
                .rev()
                .find(|v| !v.is_snapshot())
                .map(Version::to_string);
        }
        self.versioning.versions = unparsed
            .into_iter()
            .chain(versions.into_iter().map(String::from))
            .collect();
        self.versioning.last_updated = Some(timestamp.to_string());
    }

    pub fn versions(&self) -> Vec<Version> {
        self.versioning
            .versions
            .iter()
            .filter_map(|v| Version::new(v.as_str()).ok())
            .collect()
    }
}
