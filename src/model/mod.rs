use thiserror::Error;

pub mod coordinate;
pub mod dependency;
pub mod project;
pub mod version;

pub use coordinate::{ModuleId, VersionedModule};
pub use dependency::{DependencySet, Exclusion, ModuleDependency, Transitivity, VersionProvider};
pub use version::{Version, VersionComparator, VersionKind};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading configuration toml: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Missing TOML key `{0}` while parsing")]
    MissingKey(String),
    #[error("Missing coordinate component `{0}` in string `{1}`")]
    MissingCoordinateComponent(String, String),
    #[error("Coordinate {0} must not be blank")]
    Blank(&'static str),
    #[error("Invalid transitivity `{0}`, expected one of none, compile, runtime")]
    InvalidTransitivity(String),
    #[error("Invalid configuration mapping `{0}`")]
    InvalidMapping(String),
    #[error("Invalid version range `{0}`")]
    InvalidVersionRange(String),
    #[error("Invalid repository `{0}`: {1}")]
    InvalidRepository(String, String),
    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex_lite::Error),
    #[error("Invalid url: {0}")]
    Url(#[from] url::ParseError),
}
