use log::{debug, info, warn};

use crate::{
    cache::ResolutionCache,
    model::project::Project,
    publish::{FileSigner, Publisher},
    report::ResolveResult,
    repository::HttpSettings,
    resolver,
};
use std::{error::Error, path::Path};

/// Handler to resolve command
pub fn do_resolve(
    refresh: bool,
    cache_directory: &Path,
    root: &Path,
    module_file_name: &Path,
    http: &HttpSettings,
) -> Result<ResolveResult, Box<dyn Error>> {
    let project = load_project(root, module_file_name)?;
    let mut parameters = project.parameters.clone();
    parameters.refresh = refresh;

    let cache = ResolutionCache::new(cache_directory.to_path_buf())?;
    let result = resolver::resolve(
        Some(&project.module),
        &project.dependencies,
        &parameters,
        &project.repositories,
        &cache,
        http,
    )?
    .assert_no_error()?;
    debug!("Resolved {} files", result.files().len());
    Ok(result)
}

/// Handler to tree command. Unlike resolve it renders partial trees too.
pub fn do_tree(
    cache_directory: &Path,
    root: &Path,
    module_file_name: &Path,
    http: &HttpSettings,
) -> Result<Vec<String>, Box<dyn Error>> {
    let project = load_project(root, module_file_name)?;
    let cache = ResolutionCache::new(cache_directory.to_path_buf())?;
    let result = resolver::resolve(
        Some(&project.module),
        &project.dependencies,
        &project.parameters,
        &project.repositories,
        &cache,
        http,
    )?;
    if !result.report.is_fine() {
        warn!("{}", result.report);
    }
    Ok(result.tree.to_strings())
}

/// Handler to publish command. Maven repositories come first, then Ivy ones.
pub fn do_publish(
    signer: Option<&dyn FileSigner>,
    root: &Path,
    module_file_name: &Path,
    http: &HttpSettings,
) -> Result<usize, Box<dyn Error>> {
    let project = load_project(root, module_file_name)?;
    if project.publish_repositories.is_empty() {
        return Err("No publish repositories are configured".into());
    }
    let publisher = Publisher::new(
        &project.module,
        &project.publication,
        &project.dependencies,
    )
    .with_parameters(project.parameters.clone())
    .with_signer(signer);

    let repositories = &project.publish_repositories;
    let mut published = 0;
    if repositories.iter().any(|r| r.layout().is_maven()) {
        published += publisher.publish(repositories, http)?;
    }
    if repositories.iter().any(|r| !r.layout().is_maven()) {
        published += publisher.publish_ivy(repositories, http)?;
    }
    Ok(published)
}

pub fn do_clear_cache(cache_directory: &Path) -> Result<(), Box<dyn Error>> {
    if cache_directory.exists() {
        ResolutionCache::new(cache_directory.to_path_buf())?.clear()?;
    } else {
        info!("Cache {} does not exist, nothing to do", cache_directory.display());
    }
    Ok(())
}

fn load_project(root: &Path, module_file_name: &Path) -> Result<Project, Box<dyn Error>> {
    Ok(Project::from_file(&root.join(module_file_name))?)
}
