use std::{collections::HashMap, path::PathBuf, time::Duration};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::repository::HttpSettings;

pub struct MvnfetchConfig {
    pub cache_dir: Option<PathBuf>,
    pub http: HttpSettings,
}

impl MvnfetchConfig {
    pub fn load() -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(None)?;
        Ok(raw_config.into())
    }
}

impl From<RawConfig> for MvnfetchConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = HttpSettings::default();
        MvnfetchConfig {
            cache_dir: raw.cache.dir,
            http: HttpSettings {
                connect_timeout: raw
                    .http
                    .timeout
                    .map_or(defaults.connect_timeout, Duration::from_secs),
                read_timeout: raw
                    .http
                    .readtimeout
                    .map_or(defaults.read_timeout, Duration::from_secs),
            },
        }
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    http: HttpConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CacheConfig {
    dir: Option<PathBuf>,
}

/// Timeouts in seconds.
#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct HttpConfig {
    timeout: Option<u64>,
    readtimeout: Option<u64>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("MVNFETCH")
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
