//! Configurations and the mapping of declared scopes onto them.
//!
//! A dependency is included in some configurations of the depending module
//! (the master configurations) and brings in some configurations of the
//! dependency module (the target configurations). A target may name a fallback,
//! `compile(default)`, used when the dependency module does not expose the
//! requested configuration.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display},
    str::FromStr,
};

use crate::model::{ModuleDependency, ParseError, Transitivity};

pub const DEFAULT: &str = "default";
pub const MASTER: &str = "master";
pub const COMPILE: &str = "compile";
pub const RUNTIME: &str = "runtime";
pub const PROVIDED: &str = "provided";
pub const TEST: &str = "test";
pub const SYSTEM: &str = "system";
pub const OPTIONAL: &str = "optional";
pub const SOURCES: &str = "sources";
pub const JAVADOC: &str = "javadoc";
pub const ARCHIVES: &str = "archives";
pub const ALL: &str = "*";

const NONE_TARGETS: &str = "archives(master)";
const COMPILE_TARGETS: &str = "archives(master), compile(default)";
const RUNTIME_TARGETS: &str = "archives(master), compile(default), runtime(default)";

/// A configuration requested on a dependency module, with an optional fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetConf {
    pub name: String,
    pub fallback: Option<String>,
}

impl TargetConf {
    pub fn new(name: impl Into<String>) -> Self {
        TargetConf {
            name: name.into(),
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }
}

impl FromStr for TargetConf {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ParseError::InvalidMapping(s.to_string());
        match s.split_once('(') {
            Some((name, rest)) => {
                let fallback = rest.strip_suffix(')').ok_or_else(invalid)?.trim();
                if name.trim().is_empty() || fallback.is_empty() {
                    return Err(invalid());
                }
                Ok(TargetConf::new(name.trim()).with_fallback(fallback))
            }
            None if !s.is_empty() && !s.contains(')') => Ok(TargetConf::new(s)),
            None => Err(invalid()),
        }
    }
}

impl Display for TargetConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fallback {
            Some(fallback) => write!(f, "{}({})", self.name, fallback),
            None => f.write_str(&self.name),
        }
    }
}

/// Master configuration → target configurations.
///
/// Parsed from and rendered to the usual `a, b -> x(y), z; c -> d` notation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationMapping {
    entries: BTreeMap<String, Vec<TargetConf>>,
}

impl ConfigurationMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, master: &str, targets: impl IntoIterator<Item = TargetConf>) {
        let existing = self.entries.entry(master.to_string()).or_default();
        for target in targets {
            if !existing.contains(&target) {
                existing.push(target);
            }
        }
    }

    pub fn with(mut self, master: &str, targets: impl IntoIterator<Item = TargetConf>) -> Self {
        self.add(master, targets);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn masters(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[TargetConf])> {
        self.entries
            .iter()
            .map(|(master, targets)| (master.as_str(), targets.as_slice()))
    }

    /// Whether the dependency takes part in `master`, directly or through `*`.
    pub fn includes(&self, master: &str) -> bool {
        self.entries.contains_key(master) || self.entries.contains_key(ALL)
    }

    pub fn targets_for(&self, master: &str) -> Vec<&TargetConf> {
        let mut targets = Vec::new();
        for key in [master, ALL] {
            for target in self.entries.get(key).into_iter().flatten() {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        targets
    }

    pub fn merge(&mut self, other: &ConfigurationMapping) {
        for (master, targets) in &other.entries {
            self.add(master, targets.iter().cloned());
        }
    }

    /// Replaces empty target lists with the targets implied by `transitivity`.
    pub fn expand_empty_targets(mut self, transitivity: Transitivity) -> Self {
        for targets in self.entries.values_mut() {
            if targets.is_empty() {
                *targets = transitivity.targets();
            }
        }
        self
    }
}

impl FromStr for ConfigurationMapping {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mapping = ConfigurationMapping::new();
        for entry in s.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (masters, targets) = match entry.split_once("->") {
                Some((masters, targets)) => (masters, Some(targets)),
                None => (entry, None),
            };
            let targets = targets
                .map(|targets| {
                    targets
                        .split(',')
                        .filter(|t| !t.trim().is_empty())
                        .map(TargetConf::from_str)
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?
                .unwrap_or_default();
            let masters = masters
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .collect::<Vec<_>>();
            if masters.is_empty() {
                return Err(ParseError::InvalidMapping(s.to_string()));
            }
            for master in masters {
                mapping.add(master, targets.iter().cloned());
            }
        }
        if mapping.is_empty() {
            return Err(ParseError::InvalidMapping(s.to_string()));
        }
        Ok(mapping)
    }
}

impl Display for ConfigurationMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (master, targets) in &self.entries {
            if !first {
                f.write_str(";")?;
            }
            first = false;
            f.write_str(master)?;
            if !targets.is_empty() {
                let targets = targets
                    .iter()
                    .map(TargetConf::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                write!(f, "->{}", targets)?;
            }
        }
        Ok(())
    }
}

impl Transitivity {
    /// The configurations a dependency module contributes for this transitivity.
    pub fn targets(&self) -> Vec<TargetConf> {
        let expression = match self {
            Transitivity::None => NONE_TARGETS,
            Transitivity::Compile => COMPILE_TARGETS,
            Transitivity::Runtime => RUNTIME_TARGETS,
        };
        expression
            .split(',')
            .filter_map(|target| target.parse().ok())
            .collect()
    }
}

/// Scopes a well-known scope includes.
pub fn scope_parents(scope: &str) -> &'static [&'static str] {
    match scope {
        RUNTIME => &[COMPILE],
        TEST => &[RUNTIME, PROVIDED],
        _ => &[],
    }
}

/// `scopes` plus every scope they include, in a stable order.
pub fn involved_scopes<'a>(scopes: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    let mut involved = BTreeSet::new();
    let mut pending = scopes.into_iter().map(str::to_string).collect::<Vec<_>>();
    while let Some(scope) = pending.pop() {
        if involved.insert(scope.clone()) {
            pending.extend(scope_parents(&scope).iter().map(|p| p.to_string()));
        }
    }
    involved
}

/// Computes the configuration mapping of a declared dependency.
///
/// An explicit mapping wins. Declared scopes map onto the like-named configuration
/// of the dependency, falling back to `default`. Otherwise the default mapping is
/// used when given, and finally `default` mapped through the transitivity.
pub fn dependency_mapping(
    dependency: &ModuleDependency,
    default_mapping: Option<&ConfigurationMapping>,
) -> ConfigurationMapping {
    let mapping = if let Some(explicit) = &dependency.mapping {
        explicit.clone()
    } else if !dependency.scopes.is_empty() {
        let mut mapping = ConfigurationMapping::new();
        for scope in &dependency.scopes {
            let targets = match dependency.transitivity {
                Some(transitivity) => transitivity.targets(),
                None => vec![TargetConf::new(scope.as_str()).with_fallback(DEFAULT)],
            };
            mapping.add(scope, targets);
        }
        mapping
    } else if let Some(default_mapping) = default_mapping {
        default_mapping.clone()
    } else {
        ConfigurationMapping::new().with(DEFAULT, Vec::new())
    };
    mapping.expand_empty_targets(dependency.effective_transitivity())
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parse_mapping() {
        let mapping: ConfigurationMapping = "compile, runtime -> compile(default), master; test -> runtime"
            .parse()
            .unwrap();
        assert_eq!(
            mapping.to_string(),
            "compile->compile(default),master;runtime->compile(default),master;test->runtime"
        );
        assert_eq!(
            mapping.targets_for("test"),
            vec![&TargetConf::new("runtime")]
        );
        assert!(mapping.includes("runtime"));
        assert!(!mapping.includes("provided"));
    }

    #[test]
    fn reject_invalid_mapping() {
        assert!("-> compile".parse::<ConfigurationMapping>().is_err());
        assert!("compile -> runtime(".parse::<ConfigurationMapping>().is_err());
        assert!("".parse::<ConfigurationMapping>().is_err());
    }

    #[test]
    fn wildcard_master() {
        let mapping: ConfigurationMapping = "* -> master; compile -> compile".parse().unwrap();
        assert!(mapping.includes("anything"));
        assert_eq!(
            mapping.targets_for("compile"),
            vec![&TargetConf::new("compile"), &TargetConf::new("master")]
        );
    }

    #[test]
    fn transitivity_targets() {
        assert_eq!(
            Transitivity::None.targets(),
            vec![TargetConf::new("archives").with_fallback("master")]
        );
        assert_eq!(
            Transitivity::Runtime.targets(),
            vec![
                TargetConf::new("archives").with_fallback("master"),
                TargetConf::new("compile").with_fallback("default"),
                TargetConf::new("runtime").with_fallback("default"),
            ]
        );
    }

    #[test]
    fn mapping_without_scope_uses_transitivity() {
        let dependency: ModuleDependency = "com.acme:lib:1.0".parse().unwrap();
        let mapping = dependency_mapping(
            &dependency.with_transitivity(Transitivity::Compile),
            None,
        );
        assert_eq!(
            mapping.to_string(),
            "default->archives(master),compile(default)"
        );
    }

    #[test]
    fn mapping_from_scope() {
        let dependency = "com.acme:lib:1.0"
            .parse::<ModuleDependency>()
            .unwrap()
            .with_scope("test");
        assert_eq!(
            dependency_mapping(&dependency, None).to_string(),
            "test->test(default)"
        );
        let dependency = dependency.with_transitivity(Transitivity::None);
        assert_eq!(
            dependency_mapping(&dependency, None).to_string(),
            "test->archives(master)"
        );
    }

    #[test]
    fn explicit_and_default_mappings() {
        let explicit: ConfigurationMapping = "compile".parse().unwrap();
        let dependency = "com.acme:lib:1.0"
            .parse::<ModuleDependency>()
            .unwrap()
            .with_mapping(explicit);
        assert_eq!(
            dependency_mapping(&dependency, None).to_string(),
            "compile->archives(master),compile(default),runtime(default)"
        );

        let default_mapping: ConfigurationMapping = "main -> runtime".parse().unwrap();
        let plain: ModuleDependency = "com.acme:lib:1.0".parse().unwrap();
        assert_eq!(
            dependency_mapping(&plain, Some(&default_mapping)).to_string(),
            "main->runtime"
        );
    }

    #[test]
    fn involved_scopes_follow_hierarchy() {
        let scopes = involved_scopes(["test"]);
        assert_eq!(
            scopes.into_iter().collect::<Vec<_>>(),
            vec!["compile", "provided", "runtime", "test"]
        );
    }
}
