use std::collections::BTreeMap;

use log::warn;

use crate::{
    descriptor::{
        Configuration, DependencyArtifact, DependencyDescriptor, ExcludeRule, ModuleDescriptor,
        PublishedArtifact, DEFAULT_ARTIFACT_TYPE,
    },
    format::{Element, FormatError, XmlWriter},
    model::{
        DependencySet, Exclusion, ModuleDependency, ModuleId, Transitivity, Version,
        VersionedModule,
    },
    scope::{self, ConfigurationMapping},
};

pub const POM_EXTENSION: &str = "pom";

const MAX_INTERPOLATION_DEPTH: usize = 10;
const POM_NAMESPACE: &str = "http://maven.apache.org/POM/4.0.0";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const POM_SCHEMA_LOCATION: &str =
    "http://maven.apache.org/POM/4.0.0 http://maven.apache.org/xsd/maven-4.0.0.xsd";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PomDependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub classifier: Option<String>,
    pub artifact_type: Option<String>,
    pub optional: bool,
    pub exclusions: Vec<(String, String)>,
}

/// The subset of a POM needed to resolve dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pom {
    pub group_id: Option<String>,
    pub artifact_id: String,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub parent: Option<(String, String, String)>,
    pub properties: BTreeMap<String, String>,
    pub dependency_management: Vec<PomDependency>,
    pub dependencies: Vec<PomDependency>,
}

impl Pom {
    pub fn parse(bytes: &[u8]) -> Result<Pom, FormatError> {
        let root = Element::parse(bytes)?;
        if root.name != "project" {
            return Err(FormatError::Missing("project".to_string()));
        }
        let text = |element: &Element, name: &str| element.child_text(name).map(str::to_string);

        let parent = match root.child("parent") {
            Some(parent) => Some((
                text(parent, "groupId")
                    .ok_or_else(|| FormatError::Missing("parent/groupId".to_string()))?,
                text(parent, "artifactId")
                    .ok_or_else(|| FormatError::Missing("parent/artifactId".to_string()))?,
                text(parent, "version")
                    .ok_or_else(|| FormatError::Missing("parent/version".to_string()))?,
            )),
            None => None,
        };

        let properties = root
            .child("properties")
            .map(|properties| {
                properties
                    .children
                    .iter()
                    .map(|p| (p.name.clone(), p.text.trim().to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let dependency_management = root
            .child("dependencyManagement")
            .and_then(|m| m.child("dependencies"))
            .map(parse_dependencies)
            .transpose()?
            .unwrap_or_default();
        let dependencies = root
            .child("dependencies")
            .map(parse_dependencies)
            .transpose()?
            .unwrap_or_default();

        Ok(Pom {
            group_id: text(&root, "groupId"),
            artifact_id: text(&root, "artifactId")
                .ok_or_else(|| FormatError::Missing("artifactId".to_string()))?,
            version: text(&root, "version"),
            packaging: text(&root, "packaging"),
            parent,
            properties,
            dependency_management,
            dependencies,
        })
    }

    pub fn parent_module(&self) -> Result<Option<VersionedModule>, FormatError> {
        match &self.parent {
            Some((group, name, version)) => Ok(Some(VersionedModule::of(group, name, version)?)),
            None => Ok(None),
        }
    }

    pub fn packaging(&self) -> &str {
        self.packaging.as_deref().unwrap_or(DEFAULT_ARTIFACT_TYPE)
    }

    /// Takes over what the child does not declare itself from its parent.
    pub fn inherit(&mut self, parent: &Pom) {
        if self.group_id.is_none() {
            self.group_id = parent.group_id.clone();
        }
        if self.version.is_none() {
            self.version = parent.version.clone();
        }
        for (key, value) in &parent.properties {
            self.properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self.dependency_management
            .extend(parent.dependency_management.iter().cloned());
        for dependency in &parent.dependencies {
            let declared = self.dependencies.iter().any(|d| {
                d.group_id == dependency.group_id && d.artifact_id == dependency.artifact_id
            });
            if !declared {
                self.dependencies.push(dependency.clone());
            }
        }
    }

    fn property(&self, key: &str) -> Option<String> {
        let parent = self.parent.as_ref();
        match key {
            "project.version" | "pom.version" | "version" => self
                .version
                .clone()
                .or_else(|| parent.map(|p| p.2.clone())),
            "project.groupId" | "pom.groupId" | "groupId" => self
                .group_id
                .clone()
                .or_else(|| parent.map(|p| p.0.clone())),
            "project.artifactId" | "pom.artifactId" | "artifactId" => {
                Some(self.artifact_id.clone())
            }
            "project.parent.version" | "parent.version" => parent.map(|p| p.2.clone()),
            "project.parent.groupId" | "parent.groupId" => parent.map(|p| p.0.clone()),
            _ => self.properties.get(key).cloned(),
        }
    }

    /// Replaces `${...}` references with project values and properties. Unknown
    /// references are left untouched.
    pub fn interpolate(&self, value: &str) -> String {
        let mut current = value.to_string();
        for _ in 0..MAX_INTERPOLATION_DEPTH {
            let mut output = String::with_capacity(current.len());
            let mut rest = current.as_str();
            let mut changed = false;
            while let Some(start) = rest.find("${") {
                output.push_str(&rest[..start]);
                match rest[start + 2..].find('}') {
                    Some(length) => {
                        let key = &rest[start + 2..start + 2 + length];
                        match self.property(key) {
                            Some(value) => {
                                output.push_str(&value);
                                changed = true;
                            }
                            None => output.push_str(&rest[start..start + 3 + length]),
                        }
                        rest = &rest[start + 3 + length..];
                    }
                    None => {
                        output.push_str(&rest[start..]);
                        rest = "";
                    }
                }
            }
            output.push_str(rest);
            current = output;
            if !changed {
                break;
            }
        }
        current
    }

    fn managed(&self, group_id: &str, artifact_id: &str) -> Option<&PomDependency> {
        self.dependency_management.iter().find(|managed| {
            self.interpolate(&managed.group_id) == group_id
                && self.interpolate(&managed.artifact_id) == artifact_id
        })
    }

    /// Translates the POM into a module descriptor with the standard Maven configurations.
    pub fn to_descriptor(&self, id: &VersionedModule) -> Result<ModuleDescriptor, FormatError> {
        let mut descriptor = ModuleDescriptor::new(id.clone());
        for configuration in maven_configurations() {
            descriptor.add_configuration(configuration);
        }

        let packaging = self.interpolate(self.packaging());
        if let Some(extension) = packaging_extension(&packaging) {
            descriptor.artifacts.push(PublishedArtifact {
                artifact: DependencyArtifact::new(id.module_id().name(), extension)
                    .with_type(packaging.as_str()),
                confs: vec![scope::MASTER.to_string()],
            });
        }

        for dependency in &self.dependencies {
            let group_id = self.interpolate(&dependency.group_id);
            let artifact_id = self.interpolate(&dependency.artifact_id);
            let managed = self.managed(&group_id, &artifact_id);

            let Some(version) = dependency
                .version
                .as_ref()
                .or_else(|| managed.and_then(|m| m.version.as_ref()))
                .map(|v| self.interpolate(v))
            else {
                warn!(
                    "{} declares {}:{} without a version, ignoring it",
                    id, group_id, artifact_id
                );
                continue;
            };
            let dependency_scope = dependency
                .scope
                .as_ref()
                .or_else(|| managed.and_then(|m| m.scope.as_ref()))
                .map(|s| self.interpolate(s))
                .unwrap_or_else(|| scope::COMPILE.to_string());
            if dependency_scope == "import" {
                continue;
            }

            let mut descriptor_dependency = DependencyDescriptor::new(
                ModuleId::new(group_id, artifact_id.as_str())?,
                Version::new(version)?,
            );
            descriptor_dependency.mapping = if dependency.optional {
                optional_mapping()
            } else {
                scope_mapping(&dependency_scope)
            };

            let artifact_type = dependency
                .artifact_type
                .as_ref()
                .map(|t| self.interpolate(t))
                .unwrap_or_else(|| DEFAULT_ARTIFACT_TYPE.to_string());
            let classifier = dependency.classifier.as_ref().map(|c| self.interpolate(c));
            if classifier.is_some() || artifact_type != DEFAULT_ARTIFACT_TYPE {
                descriptor_dependency.artifacts.push(
                    DependencyArtifact::new(artifact_id.as_str(), type_extension(&artifact_type))
                        .with_type(artifact_type.as_str())
                        .with_classifier(classifier),
                );
            }

            let exclusions = dependency
                .exclusions
                .iter()
                .chain(managed.into_iter().flat_map(|m| m.exclusions.iter()));
            for (group, name) in exclusions {
                if group == "*" && name == "*" {
                    descriptor_dependency.transitive = false;
                    continue;
                }
                descriptor_dependency
                    .excludes
                    .push(ExcludeRule::everywhere(Exclusion {
                        group: self.interpolate(group),
                        name: self.interpolate(name),
                        classifier: None,
                        artifact_type: None,
                    }));
            }
            descriptor.add_dependency(descriptor_dependency);
        }
        Ok(descriptor)
    }
}

fn parse_dependencies(element: &Element) -> Result<Vec<PomDependency>, FormatError> {
    let text = |element: &Element, name: &str| element.child_text(name).map(str::to_string);
    element
        .children("dependency")
        .map(|dependency| {
            Ok(PomDependency {
                group_id: text(dependency, "groupId")
                    .ok_or_else(|| FormatError::Missing("dependency/groupId".to_string()))?,
                artifact_id: text(dependency, "artifactId")
                    .ok_or_else(|| FormatError::Missing("dependency/artifactId".to_string()))?,
                version: text(dependency, "version"),
                scope: text(dependency, "scope"),
                classifier: text(dependency, "classifier"),
                artifact_type: text(dependency, "type"),
                optional: dependency.child_text("optional") == Some("true"),
                exclusions: dependency
                    .child("exclusions")
                    .map(|exclusions| {
                        exclusions
                            .children("exclusion")
                            .filter_map(|e| {
                                Some((
                                    e.child_text("groupId")?.to_string(),
                                    e.child_text("artifactId")?.to_string(),
                                ))
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Configurations of a module described by a POM.
pub fn maven_configurations() -> Vec<Configuration> {
    vec![
        Configuration::new(scope::DEFAULT)
            .extending([scope::RUNTIME, scope::MASTER])
            .described("runtime dependencies and master artifact"),
        Configuration::new(scope::MASTER).described("the artifact of this module only"),
        Configuration::new(scope::COMPILE)
            .extending([scope::MASTER])
            .described("dependencies needed to compile against this module"),
        Configuration::new(scope::PROVIDED)
            .extending([scope::MASTER])
            .private(),
        Configuration::new(scope::RUNTIME)
            .extending([scope::COMPILE])
            .described("dependencies needed to run this module"),
        Configuration::new(scope::TEST)
            .extending([scope::RUNTIME])
            .private(),
        Configuration::new(scope::SYSTEM)
            .extending([scope::MASTER])
            .private(),
        Configuration::new(scope::SOURCES),
        Configuration::new(scope::JAVADOC),
        Configuration::new(scope::OPTIONAL),
    ]
}

fn mapping(expression: &str) -> ConfigurationMapping {
    expression.parse().unwrap_or_default()
}

fn scope_mapping(dependency_scope: &str) -> ConfigurationMapping {
    match dependency_scope {
        scope::PROVIDED => mapping("provided->compile(*),runtime(*),master(*)"),
        scope::RUNTIME => mapping("runtime->compile(*),runtime(*),master(*)"),
        scope::TEST => mapping("test->runtime(*),master(*)"),
        scope::SYSTEM => mapping("system->master(*)"),
        _ => mapping("compile->compile(*),master(*);runtime->runtime(*)"),
    }
}

fn optional_mapping() -> ConfigurationMapping {
    mapping("optional->compile(*),runtime(*),master(*)")
}

/// File extension of the main artifact for a packaging, `None` when there is no artifact besides the POM.
pub fn packaging_extension(packaging: &str) -> Option<&str> {
    match packaging {
        POM_EXTENSION => None,
        "bundle" | "maven-plugin" | "ejb" | "eclipse-plugin" | "jar" => Some(DEFAULT_ARTIFACT_TYPE),
        other => Some(other),
    }
}

fn type_extension(artifact_type: &str) -> &str {
    match artifact_type {
        "test-jar" | "ejb-client" | "java-source" | "javadoc" | "bundle" | "maven-plugin" => {
            DEFAULT_ARTIFACT_TYPE
        }
        other => other,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct License {
    pub name: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Developer {
    pub name: String,
    pub email: Option<String>,
    pub organization: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scm {
    pub url: Option<String>,
    pub connection: Option<String>,
    pub developer_connection: Option<String>,
}

/// Descriptive POM content not derived from the dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PomExtras {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub licenses: Vec<License>,
    pub developers: Vec<Developer>,
    pub scm: Option<Scm>,
}

fn publish_scope(dependency: &ModuleDependency) -> &str {
    let declared = dependency.scopes.iter().find(|s| {
        matches!(
            s.as_str(),
            scope::COMPILE | scope::RUNTIME | scope::PROVIDED | scope::TEST
        )
    });
    match (declared, dependency.transitivity) {
        (Some(declared), _) => declared.as_str(),
        (None, Some(Transitivity::Runtime)) => scope::RUNTIME,
        _ => scope::COMPILE,
    }
}

/// Renders the POM published along with `module`.
pub fn write_pom(
    module: &VersionedModule,
    packaging: &str,
    dependencies: &DependencySet,
    extras: &PomExtras,
) -> Result<String, FormatError> {
    let mut xml = XmlWriter::new()?;
    xml.start(
        "project",
        &[
            ("xmlns", POM_NAMESPACE),
            ("xmlns:xsi", XSI_NAMESPACE),
            ("xsi:schemaLocation", POM_SCHEMA_LOCATION),
        ],
    )?;
    xml.text_element("modelVersion", "4.0.0")?;
    xml.text_element("groupId", module.module_id().group())?;
    xml.text_element("artifactId", module.module_id().name())?;
    xml.text_element("version", module.version().as_str())?;
    xml.text_element("packaging", packaging)?;
    xml.optional_text_element("name", extras.name.as_deref())?;
    xml.optional_text_element("description", extras.description.as_deref())?;
    xml.optional_text_element("url", extras.url.as_deref())?;

    if !extras.licenses.is_empty() {
        xml.start("licenses", &[])?;
        for license in &extras.licenses {
            xml.start("license", &[])?;
            xml.text_element("name", &license.name)?;
            xml.optional_text_element("url", license.url.as_deref())?;
            xml.end("license")?;
        }
        xml.end("licenses")?;
    }
    if !extras.developers.is_empty() {
        xml.start("developers", &[])?;
        for developer in &extras.developers {
            xml.start("developer", &[])?;
            xml.text_element("name", &developer.name)?;
            xml.optional_text_element("email", developer.email.as_deref())?;
            xml.optional_text_element("organization", developer.organization.as_deref())?;
            xml.end("developer")?;
        }
        xml.end("developers")?;
    }
    if let Some(scm) = &extras.scm {
        xml.start("scm", &[])?;
        xml.optional_text_element("connection", scm.connection.as_deref())?;
        xml.optional_text_element("developerConnection", scm.developer_connection.as_deref())?;
        xml.optional_text_element("url", scm.url.as_deref())?;
        xml.end("scm")?;
    }

    if !dependencies.version_provider.is_empty() {
        xml.start("dependencyManagement", &[])?;
        xml.start("dependencies", &[])?;
        for (module_id, version) in &dependencies.version_provider {
            xml.start("dependency", &[])?;
            xml.text_element("groupId", module_id.group())?;
            xml.text_element("artifactId", module_id.name())?;
            xml.text_element("version", version.as_str())?;
            xml.end("dependency")?;
        }
        xml.end("dependencies")?;
        xml.end("dependencyManagement")?;
    }

    if !dependencies.dependencies.is_empty() {
        xml.start("dependencies", &[])?;
        for dependency in &dependencies.dependencies {
            xml.start("dependency", &[])?;
            xml.text_element("groupId", dependency.module_id().group())?;
            xml.text_element("artifactId", dependency.module_id().name())?;
            xml.text_element("version", dependency.version().as_str())?;
            if let Some(extension) = dependency
                .extension
                .as_deref()
                .filter(|e| *e != DEFAULT_ARTIFACT_TYPE)
            {
                xml.text_element("type", extension)?;
            }
            xml.optional_text_element("classifier", dependency.classifier.as_deref())?;
            xml.text_element("scope", publish_scope(dependency))?;

            let mut exclusions = dependency
                .exclusions
                .iter()
                .filter(|e| e.is_module_wide())
                .map(|e| (e.group.as_str(), e.name.as_str()))
                .collect::<Vec<_>>();
            if dependency.transitivity == Some(Transitivity::None) {
                exclusions = vec![("*", "*")];
            }
            if !exclusions.is_empty() {
                xml.start("exclusions", &[])?;
                for (group, name) in exclusions {
                    xml.start("exclusion", &[])?;
                    xml.text_element("groupId", group)?;
                    xml.text_element("artifactId", name)?;
                    xml.end("exclusion")?;
                }
                xml.end("exclusions")?;
            }
            xml.end("dependency")?;
        }
        xml.end("dependencies")?;
    }
    xml.end("project")?;
    Ok(xml.finish())
}
