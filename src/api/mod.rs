use std::{error::Error, path::PathBuf};

use crate::{
    cli::command_handlers::{do_clear_cache, do_publish, do_resolve, do_tree},
    publish::FileSigner,
    report::ResolveResult,
    repository::HttpSettings,
};

mod builder;

pub use builder::MvnfetchBuilder;

pub struct Mvnfetch {
    cache_directory: PathBuf,
    root: PathBuf,
    module_file_name: PathBuf,
    http: HttpSettings,
}

impl Mvnfetch {
    pub fn builder() -> MvnfetchBuilder {
        MvnfetchBuilder::default()
    }

    /// Resolves the dependencies declared in the project file.
    /// Fails when any of them could not be resolved.
    pub fn resolve(&self, refresh: bool) -> Result<ResolveResult, Box<dyn Error>> {
        do_resolve(
            refresh,
            &self.cache_directory,
            &self.root,
            &self.module_file_name,
            &self.http,
        )
    }

    /// The resolved dependency tree, one line per node.
    pub fn tree(&self) -> Result<Vec<String>, Box<dyn Error>> {
        do_tree(
            &self.cache_directory,
            &self.root,
            &self.module_file_name,
            &self.http,
        )
    }

    /// Publishes the project's publication to its publish repositories and returns
    /// how many repositories received it.
    pub fn publish(&self, signer: Option<&dyn FileSigner>) -> Result<usize, Box<dyn Error>> {
        do_publish(signer, &self.root, &self.module_file_name, &self.http)
    }

    pub fn clear_cache(&self) -> Result<(), Box<dyn Error>> {
        do_clear_cache(&self.cache_directory)
    }
}
