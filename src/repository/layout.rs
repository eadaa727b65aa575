//! Where files live inside a repository.

use crate::{
    descriptor::DependencyArtifact,
    format::{metadata::METADATA_FILE_NAME, pom::POM_EXTENSION},
    model::{ModuleId, VersionedModule},
};

pub const DEFAULT_IVY_ARTIFACT_PATTERN: &str =
    "[organisation]/[module]/[type]s/[artifact]-[revision](-[classifier]).[ext]";
pub const DEFAULT_IVY_DESCRIPTOR_PATTERN: &str = "[organisation]/[module]/ivys/ivy-[revision].xml";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Layout {
    #[default]
    Maven,
    Ivy {
        artifact_pattern: String,
        ivy_pattern: String,
    },
}

impl Layout {
    pub fn ivy() -> Self {
        Layout::Ivy {
            artifact_pattern: DEFAULT_IVY_ARTIFACT_PATTERN.to_string(),
            ivy_pattern: DEFAULT_IVY_DESCRIPTOR_PATTERN.to_string(),
        }
    }

    pub fn is_maven(&self) -> bool {
        matches!(self, Layout::Maven)
    }

    /// Where the versions of a module are listed and how entry names carry the version.
    pub fn version_listing(&self, module_id: &ModuleId) -> VersionListing {
        match self {
            Layout::Maven => VersionListing {
                directory: maven_module_directory(module_id),
                prefix: String::new(),
                suffix: String::new(),
            },
            Layout::Ivy { ivy_pattern, .. } => {
                let tokens = PatternTokens {
                    organisation: module_id.group(),
                    module: module_id.name(),
                    ..PatternTokens::default()
                };
                let (before, after) = ivy_pattern
                    .split_once("[revision]")
                    .unwrap_or((ivy_pattern.as_str(), ""));
                let before = substitute(before, &tokens);
                let (directory, prefix) = match before.rsplit_once('/') {
                    Some((directory, prefix)) => (directory.to_string(), prefix.to_string()),
                    None => (String::new(), before),
                };
                let after = substitute(after, &tokens);
                let suffix = after.split('/').next().unwrap_or_default().to_string();
                VersionListing {
                    directory,
                    prefix,
                    suffix,
                }
            }
        }
    }

    pub fn version_directory(&self, module: &VersionedModule) -> String {
        format!(
            "{}/{}",
            maven_module_directory(module.module_id()),
            module.version()
        )
    }

    /// Path of an artifact. `file_version` is the version in the file name, which
    /// differs from the module version for timestamped snapshots.
    pub fn artifact_path(
        &self,
        module: &VersionedModule,
        artifact: &DependencyArtifact,
        file_version: &str,
    ) -> String {
        match self {
            Layout::Maven => format!(
                "{}/{}",
                self.version_directory(module),
                artifact.file_name(file_version)
            ),
            Layout::Ivy {
                artifact_pattern, ..
            } => substitute(
                artifact_pattern,
                &PatternTokens {
                    organisation: module.module_id().group(),
                    module: module.module_id().name(),
                    revision: file_version,
                    artifact: &artifact.name,
                    artifact_type: &artifact.artifact_type,
                    ext: &artifact.extension,
                    classifier: artifact.classifier.as_deref(),
                },
            ),
        }
    }

    /// Path of the module descriptor: the POM or the ivy file.
    pub fn descriptor_path(&self, module: &VersionedModule) -> String {
        match self {
            Layout::Maven => self.artifact_path(
                module,
                &DependencyArtifact::new(module.module_id().name(), POM_EXTENSION),
                module.version().as_str(),
            ),
            Layout::Ivy { ivy_pattern, .. } => substitute(
                ivy_pattern,
                &PatternTokens {
                    organisation: module.module_id().group(),
                    module: module.module_id().name(),
                    revision: module.version().as_str(),
                    artifact: "ivy",
                    artifact_type: "ivy",
                    ext: "xml",
                    classifier: None,
                },
            ),
        }
    }

    pub fn module_metadata_path(&self, module_id: &ModuleId) -> String {
        format!(
            "{}/{}",
            maven_module_directory(module_id),
            METADATA_FILE_NAME
        )
    }

    pub fn version_metadata_path(&self, module: &VersionedModule) -> String {
        format!("{}/{}", self.version_directory(module), METADATA_FILE_NAME)
    }
}

fn maven_module_directory(module_id: &ModuleId) -> String {
    format!("{}/{}", module_id.group_path(), module_id.name())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionListing {
    pub directory: String,
    prefix: String,
    suffix: String,
}

impl VersionListing {
    /// The version carried by a directory entry, if it is a version entry at all.
    pub fn version_of<'a>(&self, entry: &'a str) -> Option<&'a str> {
        let version = entry
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        if version.is_empty()
            || version.starts_with(METADATA_FILE_NAME)
            || version.starts_with('.')
        {
            return None;
        }
        Some(version)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatternTokens<'a> {
    pub organisation: &'a str,
    pub module: &'a str,
    pub revision: &'a str,
    pub artifact: &'a str,
    pub artifact_type: &'a str,
    pub ext: &'a str,
    pub classifier: Option<&'a str>,
}

impl PatternTokens<'_> {
    fn value(&self, token: &str) -> Option<&str> {
        let value = match token {
            "organisation" | "organization" => self.organisation,
            "module" => self.module,
            "revision" => self.revision,
            "artifact" => self.artifact,
            "type" => self.artifact_type,
            "ext" => self.ext,
            "classifier" => return self.classifier.filter(|c| !c.is_empty()),
            _ => return None,
        };
        (!value.is_empty()).then_some(value)
    }
}

/// Replaces `[token]`s in a pattern. A `( )` group is dropped when one of its tokens
/// has no value, otherwise it is kept without the parentheses. Unknown tokens
/// outside groups are left as written.
pub fn substitute(pattern: &str, tokens: &PatternTokens) -> String {
    let mut output = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(open) = rest.find('(') {
        output.push_str(&replace_tokens(&rest[..open], tokens).0);
        let group = &rest[open + 1..];
        match group.find(')') {
            Some(close) => {
                let (replaced, complete) = replace_tokens(&group[..close], tokens);
                if complete {
                    output.push_str(&replaced);
                }
                rest = &group[close + 1..];
            }
            None => {
                output.push_str(&replace_tokens(&rest[open..], tokens).0);
                rest = "";
            }
        }
    }
    output.push_str(&replace_tokens(rest, tokens).0);
    output
}

/// Substituted text and whether every token had a value.
fn replace_tokens(text: &str, tokens: &PatternTokens) -> (String, bool) {
    let mut output = String::with_capacity(text.len());
    let mut complete = true;
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        output.push_str(&rest[..open]);
        match rest[open..].find(']') {
            Some(length) => {
                let token = &rest[open + 1..open + length];
                match tokens.value(token) {
                    Some(value) => output.push_str(value),
                    None => {
                        complete = false;
                        output.push_str(&rest[open..=open + length]);
                    }
                }
                rest = &rest[open + length + 1..];
            }
            None => {
                output.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    (output, complete)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn module() -> VersionedModule {
        "org.acme.tools:lib:1.2".parse().unwrap()
    }

    #[test]
    fn maven_paths() {
        let layout = Layout::Maven;
        let jar = DependencyArtifact::new("lib", "jar");
        assert_eq!(
            layout.artifact_path(&module(), &jar, "1.2"),
            "org/acme/tools/lib/1.2/lib-1.2.jar"
        );
        let sources = jar.with_classifier(Some("sources".to_string()));
        assert_eq!(
            layout.artifact_path(&module(), &sources, "1.2"),
            "org/acme/tools/lib/1.2/lib-1.2-sources.jar"
        );
        assert_eq!(
            layout.descriptor_path(&module()),
            "org/acme/tools/lib/1.2/lib-1.2.pom"
        );
        assert_eq!(
            layout.module_metadata_path(module().module_id()),
            "org/acme/tools/lib/maven-metadata.xml"
        );
        assert_eq!(
            layout.version_metadata_path(&module()),
            "org/acme/tools/lib/1.2/maven-metadata.xml"
        );
        let listing = layout.version_listing(module().module_id());
        assert_eq!(listing.directory, "org/acme/tools/lib");
        assert_eq!(listing.version_of("1.3-SNAPSHOT"), Some("1.3-SNAPSHOT"));
        assert_eq!(listing.version_of("maven-metadata.xml.md5"), None);
    }

    #[test]
    fn ivy_paths() {
        let layout = Layout::ivy();
        let jar = DependencyArtifact::new("lib", "jar");
        assert_eq!(
            layout.artifact_path(&module(), &jar, "1.2"),
            "org.acme.tools/lib/jars/lib-1.2.jar"
        );
        assert_eq!(
            layout.artifact_path(
                &module(),
                &jar.with_classifier(Some("sources".to_string())),
                "1.2"
            ),
            "org.acme.tools/lib/jars/lib-1.2-sources.jar"
        );
        assert_eq!(
            layout.descriptor_path(&module()),
            "org.acme.tools/lib/ivys/ivy-1.2.xml"
        );
        let listing = layout.version_listing(module().module_id());
        assert_eq!(listing.directory, "org.acme.tools/lib/ivys");
        assert_eq!(listing.version_of("ivy-1.2.xml"), Some("1.2"));
        assert_eq!(listing.version_of("ivy-1.2.xml.sha1"), None);
    }

    #[test]
    fn optional_groups() {
        let tokens = PatternTokens {
            module: "core",
            revision: "2.0",
            ..PatternTokens::default()
        };
        assert_eq!(
            substitute("[module](-[classifier])(_[revision]).jar", &tokens),
            "core_2.0.jar"
        );
        assert_eq!(substitute("[module]/[unknown]/x(", &tokens), "core/[unknown]/x(");
    }
}
