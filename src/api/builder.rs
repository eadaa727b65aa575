use std::{env, error::Error, path::PathBuf};

use home::home_dir;

use crate::{repository::HttpSettings, Mvnfetch};

#[derive(Default)]
pub struct MvnfetchBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    module_file_name: Option<PathBuf>,
    cache_directory_path: Option<PathBuf>,
    http: Option<HttpSettings>,
}

impl MvnfetchBuilder {
    /// Project root directory.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Name of the mvnfetch project toml file.
    ///
    /// Defaults to `mvnfetch.toml`.
    pub fn module_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_file_name = Some(path.into());
        self
    }

    /// Location of the mvnfetch cache directory.
    ///
    /// Defaults to `$HOME/.mvnfetch/cache`.
    pub fn cache_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_directory_path = Some(path.into());
        self
    }

    /// Timeouts of requests to remote repositories.
    pub fn http_settings(mut self, settings: HttpSettings) -> Self {
        self.http = Some(settings);
        self
    }

    pub fn try_build(self) -> Result<Mvnfetch, Box<dyn Error>> {
        let Self {
            root,
            module_file_name,
            cache_directory_path,
            http,
        } = self;
        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };

        let module_file_name = module_file_name.unwrap_or_else(|| PathBuf::from("mvnfetch.toml"));

        let cache_directory = match cache_directory_path {
            Some(path) => root.join(path),
            None => default_cache_directory()?,
        };

        Ok(Mvnfetch {
            cache_directory,
            root,
            module_file_name,
            http: http.unwrap_or_default(),
        })
    }
}

fn default_cache_directory() -> Result<PathBuf, Box<dyn Error>> {
    let mut cache_directory =
        home_dir().ok_or("Could not find home dir. Please define $HOME env variable.")?;
    cache_directory.push(".mvnfetch/cache");
    Ok(cache_directory)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn relative_paths_are_under_root() {
        let mvnfetch = MvnfetchBuilder::default()
            .root("/work")
            .cache_directory("cache")
            .try_build()
            .unwrap();
        assert_eq!(mvnfetch.root, PathBuf::from("/work"));
        assert_eq!(mvnfetch.cache_directory, PathBuf::from("/work/cache"));
        assert_eq!(mvnfetch.module_file_name, PathBuf::from("mvnfetch.toml"));
        assert_eq!(mvnfetch.http, HttpSettings::default());
    }
}
