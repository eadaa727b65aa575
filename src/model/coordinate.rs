use std::{
    fmt::{self, Display},
    str::FromStr,
};

use rand::Rng;
use regex_lite::Regex;

use crate::model::{version::Version, ParseError};

const ANONYMOUS_GROUP: &str = "anonymousGroup";
const ANONYMOUS_NAME: &str = "anonymousName";

/// Identity of a module regardless of its version: a group and a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId {
    group: String,
    name: String,
}

impl ModuleId {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Result<Self, ParseError> {
        let group = group.into();
        let name = name.into();
        if group.trim().is_empty() {
            return Err(ParseError::Blank("group"));
        }
        if name.trim().is_empty() {
            return Err(ParseError::Blank("name"));
        }
        Ok(ModuleId { group, name })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The group with dots turned into path separators, as used by the Maven layout.
    pub fn group_path(&self) -> String {
        self.group.replace('.', "/")
    }

    pub fn with_version(&self, version: Version) -> VersionedModule {
        VersionedModule::new(self.clone(), version)
    }
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

impl FromStr for ModuleId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = Regex::new(r"^(?P<group>[^:\s]+):(?P<name>[^:\s]+)$")?;
        let captures = re.captures(s.trim());
        let captures = captures.as_ref();
        let group = captures
            .and_then(|c| c.name("group"))
            .map(|m| m.as_str())
            .ok_or_else(|| {
                ParseError::MissingCoordinateComponent("group".to_string(), s.to_string())
            })?;
        let name = captures
            .and_then(|c| c.name("name"))
            .map(|m| m.as_str())
            .ok_or_else(|| {
                ParseError::MissingCoordinateComponent("name".to_string(), s.to_string())
            })?;
        ModuleId::new(group, name)
    }
}

/// A module identity pinned to a version. This is the unit of identity of a resolved node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionedModule {
    module_id: ModuleId,
    version: Version,
}

impl VersionedModule {
    pub fn new(module_id: ModuleId, version: Version) -> Self {
        VersionedModule { module_id, version }
    }

    pub fn of(group: &str, name: &str, version: &str) -> Result<Self, ParseError> {
        Ok(VersionedModule {
            module_id: ModuleId::new(group, name)?,
            version: Version::new(version)?,
        })
    }

    /// Synthesizes a throwaway identity for resolutions that do not belong to a published module.
    pub fn anonymous() -> Self {
        let version = rand::thread_rng().gen::<u64>().to_string();
        VersionedModule {
            module_id: ModuleId {
                group: ANONYMOUS_GROUP.to_string(),
                name: ANONYMOUS_NAME.to_string(),
            },
            version: Version::from_trusted(version),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.module_id.group == ANONYMOUS_GROUP && self.module_id.name == ANONYMOUS_NAME
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn with_version(&self, version: Version) -> VersionedModule {
        VersionedModule::new(self.module_id.clone(), version)
    }
}

impl Display for VersionedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module_id, self.version)
    }
}

impl FromStr for VersionedModule {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().rsplit_once(':') {
            Some((module, version)) if module.contains(':') => Ok(VersionedModule::new(
                module.parse()?,
                Version::new(version)?,
            )),
            _ => Err(ParseError::MissingCoordinateComponent(
                "version".to_string(),
                s.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parse_module_id() {
        let id: ModuleId = "org.slf4j:slf4j-api".parse().unwrap();
        assert_eq!(id.group(), "org.slf4j");
        assert_eq!(id.name(), "slf4j-api");
        assert_eq!(id.group_path(), "org/slf4j");
        assert_eq!(id.to_string(), "org.slf4j:slf4j-api");
    }

    #[test]
    fn reject_blank_components() {
        assert!(matches!(
            ModuleId::new(" ", "name"),
            Err(ParseError::Blank("group"))
        ));
        assert!(matches!(
            ModuleId::new("group", ""),
            Err(ParseError::Blank("name"))
        ));
        assert!(matches!(
            VersionedModule::of("group", "name", ""),
            Err(ParseError::Blank("version"))
        ));
    }

    #[test]
    fn parse_versioned_module() {
        let module: VersionedModule = "com.acme:lib:1.0-SNAPSHOT".parse().unwrap();
        assert_eq!(module.module_id(), &ModuleId::new("com.acme", "lib").unwrap());
        assert_eq!(module.version().as_str(), "1.0-SNAPSHOT");
        assert_eq!(module.to_string(), "com.acme:lib:1.0-SNAPSHOT");
    }

    #[test]
    fn versioned_module_requires_version() {
        let error = "com.acme:lib".parse::<VersionedModule>().unwrap_err();
        assert!(matches!(
            error,
            ParseError::MissingCoordinateComponent(component, _) if component == "version"
        ));
    }

    #[test]
    fn anonymous_modules_are_distinct() {
        let first = VersionedModule::anonymous();
        let second = VersionedModule::anonymous();
        assert!(first.is_anonymous());
        assert_eq!(first.module_id(), second.module_id());
        assert_ne!(first.version(), second.version());
        assert!(!"com.acme:lib:1.0"
            .parse::<VersionedModule>()
            .unwrap()
            .is_anonymous());
    }
}
