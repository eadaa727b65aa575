use std::collections::BTreeSet;

use crate::{
    descriptor::{
        Configuration, DependencyArtifact, DependencyDescriptor, ExcludeRule, MatcherKind,
        ModuleDescriptor, PublishedArtifact, VersionMediator, DEFAULT_ARTIFACT_TYPE,
    },
    format::{Element, FormatError, XmlWriter},
    model::{Exclusion, ModuleId, Version, VersionedModule},
    resolver::ConflictStrategy,
    scope::{self, ConfigurationMapping, TargetConf},
};

pub const IVY_FILE_NAME: &str = "ivy.xml";

const EXTRA_NAMESPACE: &str = "http://ant.apache.org/ivy/extra";
const DEFAULT_DEPENDENCY_MAPPING: &str = "*->*";

fn conflict_manager_name(strategy: ConflictStrategy) -> Option<&'static str> {
    match strategy {
        ConflictStrategy::Default => None,
        ConflictStrategy::Strict => Some("strict"),
        ConflictStrategy::LatestCompatible => Some("latest-compatible"),
        ConflictStrategy::LatestVersion => Some("latest-revision"),
    }
}

fn conflict_manager(name: &str) -> Result<ConflictStrategy, FormatError> {
    match name {
        "strict" => Ok(ConflictStrategy::Strict),
        "latest-compatible" => Ok(ConflictStrategy::LatestCompatible),
        "latest-revision" | "latest-time" => Ok(ConflictStrategy::LatestVersion),
        "default" | "all" | "no-conflict" => Ok(ConflictStrategy::Default),
        other => Err(FormatError::InvalidValue(
            "conflict/manager".to_string(),
            other.to_string(),
        )),
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn flag(element: &Element, name: &str, default: bool) -> bool {
    element.attribute(name).map_or(default, |v| v == "true")
}

fn artifact_attributes(artifact: &DependencyArtifact) -> Vec<(&str, &str)> {
    let mut attributes = vec![
        ("name", artifact.name.as_str()),
        ("type", artifact.artifact_type.as_str()),
        ("ext", artifact.extension.as_str()),
    ];
    if let Some(classifier) = &artifact.classifier {
        attributes.push(("e:classifier", classifier.as_str()));
    }
    attributes
}

fn exclude_attributes(rule: &ExcludeRule, confs: &str) -> Vec<(&'static str, String)> {
    let mut attributes = vec![
        ("org", rule.exclusion.group.clone()),
        ("module", rule.exclusion.name.clone()),
    ];
    if let Some(artifact_type) = &rule.exclusion.artifact_type {
        attributes.push(("type", artifact_type.clone()));
    }
    if let Some(classifier) = &rule.exclusion.classifier {
        attributes.push(("e:classifier", classifier.clone()));
    }
    if !confs.is_empty() {
        attributes.push(("conf", confs.to_string()));
    }
    attributes
}

fn write_exclude(xml: &mut XmlWriter, rule: &ExcludeRule) -> Result<(), FormatError> {
    let confs = rule.confs.iter().cloned().collect::<Vec<_>>().join(",");
    let attributes = exclude_attributes(rule, &confs);
    let borrowed = attributes
        .iter()
        .map(|(k, v)| (*k, v.as_str()))
        .collect::<Vec<_>>();
    xml.empty("exclude", &borrowed)
}

/// Renders a module descriptor as an Ivy file.
pub fn write_ivy(descriptor: &ModuleDescriptor) -> Result<String, FormatError> {
    let id = &descriptor.id;
    let mut xml = XmlWriter::new()?;
    xml.start(
        "ivy-module",
        &[("version", "2.0"), ("xmlns:e", EXTRA_NAMESPACE)],
    )?;
    xml.empty(
        "info",
        &[
            ("organisation", id.module_id().group()),
            ("module", id.module_id().name()),
            ("revision", id.version().as_str()),
            ("status", descriptor.status.as_str()),
        ],
    )?;

    xml.start("configurations", &[])?;
    for configuration in &descriptor.configurations {
        let extends = configuration.extends.join(",");
        let mut attributes = vec![
            ("name", configuration.name.as_str()),
            (
                "visibility",
                if configuration.public {
                    "public"
                } else {
                    "private"
                },
            ),
        ];
        if !extends.is_empty() {
            attributes.push(("extends", extends.as_str()));
        }
        if !configuration.transitive {
            attributes.push(("transitive", "false"));
        }
        if let Some(description) = &configuration.description {
            attributes.push(("description", description.as_str()));
        }
        xml.empty("conf", &attributes)?;
    }
    xml.end("configurations")?;

    xml.start("publications", &[])?;
    for published in &descriptor.artifacts {
        let confs = published.confs.join(",");
        let mut attributes = artifact_attributes(&published.artifact);
        attributes.push(("conf", confs.as_str()));
        xml.empty("artifact", &attributes)?;
    }
    xml.end("publications")?;

    xml.start("dependencies", &[])?;
    for dependency in &descriptor.dependencies {
        let mapping = dependency.mapping.to_string();
        let attributes = [
            ("org", dependency.module.group()),
            ("name", dependency.module.name()),
            ("rev", dependency.revision.as_str()),
            ("force", if dependency.force { "true" } else { "false" }),
            (
                "changing",
                if dependency.changing { "true" } else { "false" },
            ),
            (
                "transitive",
                if dependency.transitive {
                    "true"
                } else {
                    "false"
                },
            ),
            ("conf", mapping.as_str()),
        ];
        if dependency.artifacts.is_empty() && dependency.excludes.is_empty() {
            xml.empty("dependency", &attributes)?;
            continue;
        }
        xml.start("dependency", &attributes)?;
        for artifact in &dependency.artifacts {
            xml.empty("artifact", &artifact_attributes(artifact))?;
        }
        for rule in &dependency.excludes {
            write_exclude(&mut xml, rule)?;
        }
        xml.end("dependency")?;
    }
    for rule in &descriptor.exclude_rules {
        write_exclude(&mut xml, rule)?;
    }
    for mediator in &descriptor.mediators {
        let matcher = match mediator.matcher() {
            MatcherKind::Exact => "exact",
            MatcherKind::Regex => "regexp",
        };
        xml.empty(
            "override",
            &[
                ("org", mediator.module().group()),
                ("module", mediator.module().name()),
                ("rev", mediator.version().as_str()),
                ("matcher", matcher),
            ],
        )?;
    }
    if let Some(manager) = descriptor.conflict_manager.and_then(conflict_manager_name) {
        xml.empty("conflict", &[("manager", manager)])?;
    }
    xml.end("dependencies")?;
    xml.end("ivy-module")?;
    Ok(xml.finish())
}

fn required<'a>(element: &'a Element, name: &str) -> Result<&'a str, FormatError> {
    element
        .attribute(name)
        .ok_or_else(|| FormatError::Missing(format!("{}/@{}", element.name, name)))
}

fn parse_artifact(element: &Element, default_name: &str) -> DependencyArtifact {
    let name = element.attribute("name").unwrap_or(default_name);
    let artifact_type = element.attribute("type").unwrap_or(DEFAULT_ARTIFACT_TYPE);
    let extension = element.attribute("ext").unwrap_or(artifact_type);
    DependencyArtifact::new(name, extension)
        .with_type(artifact_type)
        .with_classifier(element.attribute("classifier").map(str::to_string))
}

fn parse_exclude(element: &Element) -> ExcludeRule {
    ExcludeRule {
        exclusion: Exclusion {
            group: element.attribute("org").unwrap_or(scope::ALL).to_string(),
            name: element.attribute("module").unwrap_or(scope::ALL).to_string(),
            classifier: element.attribute("classifier").map(str::to_string),
            artifact_type: element.attribute("type").map(str::to_string),
        },
        confs: split_list(element.attribute("conf"))
            .into_iter()
            .collect::<BTreeSet<_>>(),
    }
}

/// Ivy maps a bare master configuration onto the like-named configuration.
fn parse_dependency_mapping(value: &str) -> Result<ConfigurationMapping, FormatError> {
    let parsed: ConfigurationMapping = value.parse()?;
    let mut mapping = ConfigurationMapping::new();
    for (master, targets) in parsed.entries() {
        if targets.is_empty() {
            mapping.add(master, [TargetConf::new(master)]);
        } else {
            mapping.add(master, targets.iter().cloned());
        }
    }
    Ok(mapping)
}

pub fn parse_ivy(bytes: &[u8]) -> Result<ModuleDescriptor, FormatError> {
    let root = Element::parse(bytes)?;
    if root.name != "ivy-module" {
        return Err(FormatError::Missing("ivy-module".to_string()));
    }
    let info = root
        .child("info")
        .ok_or_else(|| FormatError::Missing("info".to_string()))?;
    let id = VersionedModule::of(
        required(info, "organisation")?,
        required(info, "module")?,
        required(info, "revision")?,
    )?;
    let module_name = id.module_id().name().to_string();
    let mut descriptor = ModuleDescriptor::new(id);
    if let Some(status) = info.attribute("status") {
        descriptor.status = status.to_string();
    }

    for conf in root
        .child("configurations")
        .into_iter()
        .flat_map(|c| c.children("conf"))
    {
        let mut configuration = Configuration::new(required(conf, "name")?)
            .extending(split_list(conf.attribute("extends")).iter().map(String::as_str));
        configuration.public = conf.attribute("visibility") != Some("private");
        configuration.transitive = flag(conf, "transitive", true);
        configuration.description = conf.attribute("description").map(str::to_string);
        descriptor.add_configuration(configuration);
    }
    if descriptor.configurations.is_empty() {
        descriptor.add_configuration(Configuration::new(scope::DEFAULT));
    }

    match root.child("publications") {
        Some(publications) => {
            for artifact in publications.children("artifact") {
                let mut confs = split_list(artifact.attribute("conf"));
                if confs.is_empty() {
                    confs.push(scope::ALL.to_string());
                }
                descriptor.artifacts.push(PublishedArtifact {
                    artifact: parse_artifact(artifact, &module_name),
                    confs,
                });
            }
        }
        None => descriptor.artifacts.push(PublishedArtifact {
            artifact: DependencyArtifact::new(module_name.as_str(), DEFAULT_ARTIFACT_TYPE),
            confs: vec![scope::ALL.to_string()],
        }),
    }

    if let Some(dependencies) = root.child("dependencies") {
        for element in &dependencies.children {
            match element.name.as_str() {
                "dependency" => {
                    let module = ModuleId::new(required(element, "org")?, required(element, "name")?)?;
                    let revision = Version::new(required(element, "rev")?)?;
                    let mut dependency = DependencyDescriptor::new(module, revision);
                    dependency.force = flag(element, "force", dependency.force);
                    dependency.changing = flag(element, "changing", dependency.changing);
                    dependency.transitive = flag(element, "transitive", true);
                    dependency.mapping = parse_dependency_mapping(
                        element.attribute("conf").unwrap_or(DEFAULT_DEPENDENCY_MAPPING),
                    )?;
                    let dependency_name = dependency.module.name().to_string();
                    for child in &element.children {
                        match child.name.as_str() {
                            "artifact" => dependency
                                .artifacts
                                .push(parse_artifact(child, &dependency_name)),
                            "exclude" => dependency.excludes.push(parse_exclude(child)),
                            _ => {}
                        }
                    }
                    descriptor.add_dependency(dependency);
                }
                "exclude" => descriptor.exclude_rules.push(parse_exclude(element)),
                "override" => {
                    let matcher = match element.attribute("matcher") {
                        Some("regexp") => MatcherKind::Regex,
                        _ => MatcherKind::Exact,
                    };
                    descriptor.mediators.push(VersionMediator::new(
                        ModuleId::new(
                            element.attribute("org").unwrap_or(".*"),
                            element.attribute("module").unwrap_or(".*"),
                        )?,
                        Version::new(required(element, "rev")?)?,
                        matcher,
                    ));
                }
                "conflict" => {
                    descriptor.conflict_manager =
                        conflict_manager(element.attribute("manager").unwrap_or("default"))?
                            .bound();
                }
                _ => {}
            }
        }
    }
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::{
        descriptor::build_descriptor,
        model::{DependencySet, ModuleDependency, Transitivity, VersionProvider},
        resolver::ResolutionParameters,
    };

    #[test]
    fn write_built_descriptor() {
        let dependencies = DependencySet::new()
            .and(
                "org.lib:core:1.0"
                    .parse::<ModuleDependency>()
                    .unwrap()
                    .with_scope("compile")
                    .excluding("commons-logging:commons-logging".parse().unwrap()),
            )
            .and(
                "org.lib:natives:2.0:linux"
                    .parse::<ModuleDependency>()
                    .unwrap()
                    .with_scope("runtime")
                    .with_extension("zip")
                    .with_transitivity(Transitivity::None),
            )
            .with_global_exclusion("log4j:log4j".parse().unwrap())
            .with_version_provider(
                VersionProvider::new()
                    .with("org.lib:util".parse().unwrap(), Version::new("3.0").unwrap()),
            );
        let parameters = ResolutionParameters {
            conflict_strategy: ConflictStrategy::Strict,
            ..ResolutionParameters::default()
        };
        let module = "com.acme:app:1.0".parse().unwrap();
        let descriptor = build_descriptor(&module, &dependencies, &parameters);
        let ivy = write_ivy(&descriptor).unwrap();
        assert_eq!(
            ivy,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ivy-module version="2.0" xmlns:e="http://ant.apache.org/ivy/extra">
  <info organisation="com.acme" module="app" revision="1.0" status="release"/>
  <configurations>
    <conf name="compile" visibility="public"/>
    <conf name="runtime" visibility="public" extends="compile"/>
  </configurations>
  <publications>
  </publications>
  <dependencies>
    <dependency org="org.lib" name="core" rev="1.0" force="true" changing="false" transitive="true" conf="compile-&gt;compile(default)">
      <exclude org="commons-logging" module="commons-logging" conf="compile"/>
    </dependency>
    <dependency org="org.lib" name="natives" rev="2.0" force="true" changing="false" transitive="false" conf="runtime-&gt;archives(master)">
      <artifact name="natives" type="zip" ext="zip" e:classifier="linux"/>
    </dependency>
    <exclude org="log4j" module="log4j"/>
    <override org="org.lib" module="util" rev="3.0" matcher="exact"/>
    <conflict manager="strict"/>
  </dependencies>
</ivy-module>
"#
        );

        let parsed = parse_ivy(ivy.as_bytes()).unwrap();
        assert_eq!(parsed.id, descriptor.id);
        assert_eq!(parsed.configurations, descriptor.configurations);
        assert_eq!(parsed.dependencies, descriptor.dependencies);
        assert_eq!(parsed.exclude_rules, descriptor.exclude_rules);
        assert_eq!(parsed.mediators, descriptor.mediators);
        assert_eq!(parsed.conflict_manager, Some(ConflictStrategy::Strict));
        assert!(parsed.artifacts.is_empty());
    }

    #[test]
    fn parse_minimal_ivy_file() {
        let descriptor = parse_ivy(
            br#"<ivy-module version="2.0">
  <info organisation="org.acme" module="tool" revision="1.2"/>
  <dependencies>
    <dependency org="org.lib" name="core" rev="latest.integration" conf="compile"/>
  </dependencies>
</ivy-module>"#,
        )
        .unwrap();
        assert_eq!(descriptor.configurations, vec![Configuration::new("default")]);
        assert_eq!(descriptor.artifacts[0].artifact.file_name("1.2"), "tool-1.2.jar");
        assert_eq!(descriptor.artifacts[0].confs, vec!["*"]);

        let core = &descriptor.dependencies[0];
        assert!(!core.force);
        assert!(core.changing);
        assert_eq!(core.mapping.to_string(), "compile->compile");
    }

    #[test]
    fn dependency_without_conf_maps_everything() {
        let descriptor = parse_ivy(
            br#"<ivy-module version="2.0">
  <info organisation="org.acme" module="tool" revision="1.2"/>
  <publications>
    <artifact name="tool" type="source" ext="jar" conf="sources" e:classifier="sources"/>
  </publications>
  <dependencies>
    <dependency org="org.lib" name="core" rev="1.0"/>
  </dependencies>
</ivy-module>"#,
        )
        .unwrap();
        assert_eq!(descriptor.dependencies[0].mapping.to_string(), "*->*");
        assert_eq!(
            descriptor.artifacts[0].artifact.file_name("1.2"),
            "tool-1.2-sources.jar"
        );
    }

    #[test]
    fn reject_unknown_conflict_manager() {
        let result = parse_ivy(
            br#"<ivy-module version="2.0">
  <info organisation="org.acme" module="tool" revision="1.2"/>
  <dependencies><conflict manager="coin-toss"/></dependencies>
</ivy-module>"#,
        );
        assert!(matches!(result, Err(FormatError::InvalidValue(_, _))));
    }
}
