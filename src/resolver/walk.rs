//! The dependency graph walker.
//!
//! A walk is a breadth first traversal of the dependency graph starting from
//! every configuration of the root. It is repeated with the versions picked by
//! the conflict strategy until that selection no longer changes.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    path::PathBuf,
    rc::Rc,
};

use log::{debug, trace, warn};

use crate::{
    descriptor::{DependencyArtifact, DependencyDescriptor, ExcludeRule, ModuleDescriptor},
    model::{ModuleId, Version, VersionComparator, VersionedModule},
    scope::TargetConf,
    tree::{FlatNode, ModuleNodeInfo},
};

use super::{ConflictStrategy, ModuleSource, ResolutionParameters, VersionRequest};

const MAX_PASSES: usize = 32;

pub(crate) struct Walked {
    pub nodes: Vec<FlatNode>,
    pub artifacts: BTreeMap<VersionedModule, Vec<PathBuf>>,
}

struct Request {
    caller: ModuleId,
    transitive_edge: bool,
    dependency: DependencyDescriptor,
    targets: Vec<TargetConf>,
    root_conf: String,
    excludes: Vec<ExcludeRule>,
}

#[derive(Default)]
struct Pass {
    nodes: Vec<FlatNode>,
    positions: HashMap<(ModuleId, ModuleId), usize>,
    requests: BTreeMap<ModuleId, Vec<VersionRequest>>,
    wanted: BTreeMap<VersionedModule, Vec<DependencyArtifact>>,
}

impl Pass {
    /// Records a node, folding it into an earlier node of the same caller and module.
    fn record(&mut self, node: FlatNode) {
        let key = (node.caller.clone(), node.info.module_id.clone());
        match self.positions.get(&key) {
            Some(&position) => {
                let existing = &mut self.nodes[position];
                existing
                    .info
                    .declared_confs
                    .extend(node.info.declared_confs);
                existing.info.root_confs.extend(node.info.root_confs);
                for problem in node.problems {
                    if !existing.problems.contains(&problem) {
                        existing.problems.push(problem);
                    }
                }
            }
            None => {
                self.positions.insert(key, self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    fn request(&mut self, module_id: &ModuleId, request: VersionRequest) {
        let requests = self.requests.entry(module_id.clone()).or_default();
        if !requests.contains(&request) {
            requests.push(request);
        }
    }

    fn want(&mut self, module: &VersionedModule, artifact: DependencyArtifact) {
        let wanted = self.wanted.entry(module.clone()).or_default();
        if !wanted.contains(&artifact) {
            wanted.push(artifact);
        }
    }

    /// The first node of a module that was neither evicted nor blacklisted.
    fn live_node(&mut self, module_id: &ModuleId, version: Option<&Version>) -> Option<&mut FlatNode> {
        self.nodes.iter_mut().find(|node| {
            !node.blacklisted
                && !node.info.evicted
                && &node.info.module_id == module_id
                && version.map_or(true, |v| &node.info.resolved_version == v)
        })
    }
}

struct Walker<'a> {
    root: &'a ModuleDescriptor,
    source: &'a dyn ModuleSource,
    strategy: ConflictStrategy,
    comparator: VersionComparator,
    descriptors: HashMap<VersionedModule, Result<Option<Rc<ModuleDescriptor>>, String>>,
    dynamic: HashMap<(ModuleId, Version), Result<Version, String>>,
}

pub(crate) fn walk(
    root: &ModuleDescriptor,
    source: &dyn ModuleSource,
    parameters: &ResolutionParameters,
) -> Walked {
    let mut walker = Walker {
        root,
        source,
        strategy: root
            .conflict_manager
            .unwrap_or(parameters.conflict_strategy),
        comparator: parameters.version_comparator,
        descriptors: HashMap::new(),
        dynamic: HashMap::new(),
    };

    let mut selected = BTreeMap::new();
    let mut pass = walker.pass(&selected);
    let mut passes = 1;
    let conflicts = loop {
        let (next, conflicts) = walker.select(&pass.requests);
        if next == selected {
            break conflicts;
        }
        if passes >= MAX_PASSES {
            warn!(
                "Version selection did not settle after {} passes, keeping the last one",
                MAX_PASSES
            );
            break conflicts;
        }
        trace!("Pass {} selected {:?}", passes, next);
        selected = next;
        pass = walker.pass(&selected);
        passes += 1;
    };

    for (module_id, message) in conflicts {
        if let Some(node) = pass.live_node(&module_id, None) {
            node.problems.push(message);
        }
    }
    for node in pass.nodes.iter().filter(|node| node.info.evicted) {
        warn!(
            "{}:{} requested by {} was evicted in favour of {}",
            node.info.module_id,
            node.info.resolved_version,
            node.caller,
            selected
                .get(&node.info.module_id)
                .map(Version::as_str)
                .unwrap_or("another version")
        );
    }

    let artifacts = walker.download(&mut pass);
    Walked {
        nodes: pass.nodes,
        artifacts,
    }
}

impl<'a> Walker<'a> {
    /// Winners for the modules requested in more than one version, and the conflicts
    /// the strategy reported.
    fn select(
        &self,
        requests: &BTreeMap<ModuleId, Vec<VersionRequest>>,
    ) -> (BTreeMap<ModuleId, Version>, BTreeMap<ModuleId, String>) {
        let mut selected = BTreeMap::new();
        let mut conflicts = BTreeMap::new();
        for (module_id, requests) in requests {
            let distinct = requests
                .iter()
                .map(|request| &request.resolved)
                .collect::<BTreeSet<_>>();
            if distinct.len() < 2 {
                continue;
            }
            if let Some(selection) = self.strategy.select(module_id, requests, self.comparator) {
                if let Some(conflict) = selection.conflict {
                    conflicts.insert(module_id.clone(), conflict);
                }
                selected.insert(module_id.clone(), selection.winner);
            }
        }
        (selected, conflicts)
    }

    fn pass(&mut self, selected: &BTreeMap<ModuleId, Version>) -> Pass {
        let mut pass = Pass::default();
        let mut queue = VecDeque::new();
        let mut visited = HashSet::new();

        for configuration in &self.root.configurations {
            let active = self
                .root
                .expand_configurations([configuration.name.as_str()]);
            enqueue_dependencies(
                &mut queue,
                self.root,
                &active,
                &configuration.name,
                &[],
                false,
            );
        }
        while let Some(request) = queue.pop_front() {
            self.visit(request, selected, &mut pass, &mut visited, &mut queue);
        }
        pass
    }

    fn visit(
        &mut self,
        request: Request,
        selected: &BTreeMap<ModuleId, Version>,
        pass: &mut Pass,
        visited: &mut HashSet<(VersionedModule, BTreeSet<String>, String)>,
        queue: &mut VecDeque<Request>,
    ) {
        let module_id = request.dependency.module.clone();
        let declared = request.dependency.revision.clone();
        let node = |resolved: Version| {
            let mut info = ModuleNodeInfo::new(module_id.clone(), declared.clone(), resolved);
            info.root_confs.insert(request.root_conf.clone());
            FlatNode::new(request.caller.clone(), info)
        };

        if request
            .excludes
            .iter()
            .any(|rule| rule.excludes_module(&module_id))
        {
            debug!("{} is excluded from {}", module_id, request.caller);
            let mut blacklisted = node(declared.clone());
            blacklisted.blacklisted = true;
            pass.record(blacklisted);
            return;
        }

        let constraint = if request.transitive_edge {
            self.root
                .mediated_version(&module_id)
                .cloned()
                .unwrap_or_else(|| declared.clone())
        } else {
            declared.clone()
        };
        let resolved = match self.resolve_version(&module_id, &constraint) {
            Ok(resolved) => resolved,
            Err(problem) => {
                let mut failed = node(constraint);
                failed.problems.push(problem);
                pass.record(failed);
                return;
            }
        };
        pass.request(
            &module_id,
            VersionRequest {
                constraint,
                resolved: resolved.clone(),
            },
        );

        if selected
            .get(&module_id)
            .is_some_and(|winner| winner != &resolved)
        {
            let mut evicted = node(resolved);
            evicted.info.evicted = true;
            pass.record(evicted);
            return;
        }

        let versioned = module_id.with_version(resolved.clone());
        let descriptor = match self.descriptor(&versioned) {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                let mut missing = node(resolved);
                missing
                    .problems
                    .push(format!("Module {} not found in any repository", versioned));
                pass.record(missing);
                return;
            }
            Err(problem) => {
                let mut failed = node(resolved);
                failed.problems.push(problem);
                pass.record(failed);
                return;
            }
        };

        let confs = request
            .targets
            .iter()
            .flat_map(|target| descriptor.resolve_target(target))
            .collect::<BTreeSet<_>>();
        let mut found = node(resolved);
        if confs.is_empty() {
            let targets = request
                .targets
                .iter()
                .map(TargetConf::to_string)
                .collect::<Vec<_>>();
            found.problems.push(format!(
                "Configuration(s) {} not found in {}",
                targets.join(", "),
                versioned
            ));
            pass.record(found);
            return;
        }
        found.info.declared_confs = confs.clone();
        pass.record(found);

        let active = descriptor.expand_configurations(confs.iter().map(String::as_str));
        let artifacts = if request.dependency.artifacts.is_empty() {
            descriptor
                .artifacts
                .iter()
                .filter(|published| {
                    published
                        .confs
                        .iter()
                        .any(|conf| conf == crate::scope::ALL || active.contains(conf))
                })
                .map(|published| published.artifact.clone())
                .collect()
        } else {
            request.dependency.artifacts.clone()
        };
        for artifact in artifacts {
            let excluded = request.excludes.iter().any(|rule| {
                !rule.exclusion.is_module_wide() && rule.excludes_artifact(&module_id, &artifact)
            });
            if !excluded {
                pass.want(&versioned, artifact);
            }
        }

        if !visited.insert((versioned, confs, request.root_conf.clone())) {
            return;
        }
        if !request.dependency.transitive {
            return;
        }
        let followed = active
            .iter()
            .filter(|conf| {
                descriptor
                    .configuration(conf)
                    .map_or(true, |configuration| configuration.transitive)
            })
            .cloned()
            .collect::<BTreeSet<_>>();
        enqueue_dependencies(
            queue,
            &descriptor,
            &followed,
            &request.root_conf,
            &request.excludes,
            true,
        );
    }

    fn resolve_version(&mut self, module_id: &ModuleId, constraint: &Version) -> Result<Version, String> {
        if !constraint.is_dynamic() {
            return Ok(constraint.clone());
        }
        let key = (module_id.clone(), constraint.clone());
        if let Some(resolved) = self.dynamic.get(&key) {
            return resolved.clone();
        }
        let resolved = self.find_version(module_id, constraint);
        match &resolved {
            Ok(version) => debug!("{} {} resolved to {}", module_id, constraint, version),
            Err(problem) => warn!("{}", problem),
        }
        self.dynamic.insert(key, resolved.clone());
        resolved
    }

    fn find_version(&self, module_id: &ModuleId, constraint: &Version) -> Result<Version, String> {
        let versions = self
            .source
            .list_versions(module_id)
            .map_err(|error| format!("{:#}", error))?;
        let mut accepted = Vec::new();
        for version in &versions {
            if constraint
                .accepts(version, self.comparator)
                .map_err(|error| error.to_string())?
            {
                accepted.push(version);
            }
        }
        self.comparator
            .max(accepted)
            .cloned()
            .ok_or_else(|| format!("No version of {} matches {}", module_id, constraint))
    }

    fn descriptor(
        &mut self,
        module: &VersionedModule,
    ) -> Result<Option<Rc<ModuleDescriptor>>, String> {
        if let Some(known) = self.descriptors.get(module) {
            return known.clone();
        }
        let found = match self.source.descriptor(module) {
            Ok(found) => Ok(found.map(Rc::new)),
            Err(error) => Err(format!("{:#}", error)),
        };
        self.descriptors.insert(module.clone(), found.clone());
        found
    }

    fn download(&self, pass: &mut Pass) -> BTreeMap<VersionedModule, Vec<PathBuf>> {
        let mut index = BTreeMap::new();
        let wanted = std::mem::take(&mut pass.wanted);
        for (module, artifacts) in wanted {
            let mut files = Vec::new();
            for artifact in artifacts {
                match self.source.artifact(&module, &artifact) {
                    Ok(path) => files.push(path),
                    Err(error) => {
                        warn!("Cannot download {} of {}: {:#}", artifact.name, module, error);
                        if let Some(node) = pass.live_node(module.module_id(), Some(module.version())) {
                            node.problems.push(format!("{:#}", error));
                        }
                    }
                }
            }
            index.insert(module, files);
        }
        index
    }
}

/// Queues the dependencies `descriptor` declares in its `active` configurations.
fn enqueue_dependencies(
    queue: &mut VecDeque<Request>,
    descriptor: &ModuleDescriptor,
    active: &BTreeSet<String>,
    root_conf: &str,
    inherited: &[ExcludeRule],
    transitive_edge: bool,
) {
    let module_excludes = descriptor
        .exclude_rules
        .iter()
        .filter(|rule| active.iter().any(|conf| rule.applies_in(conf)))
        .cloned()
        .collect::<Vec<_>>();

    for dependency in &descriptor.dependencies {
        let mut masters = Vec::new();
        let mut targets: Vec<TargetConf> = Vec::new();
        for conf in active {
            if !dependency.mapping.includes(conf) {
                continue;
            }
            masters.push(conf.as_str());
            for target in dependency.mapping.targets_for(conf) {
                if !targets.contains(target) {
                    targets.push(target.clone());
                }
            }
        }
        if targets.is_empty() {
            continue;
        }

        let mut excludes = inherited.to_vec();
        excludes.extend(module_excludes.iter().cloned());
        excludes.extend(
            dependency
                .excludes
                .iter()
                .filter(|rule| masters.iter().any(|master| rule.applies_in(master)))
                .cloned(),
        );
        queue.push_back(Request {
            caller: descriptor.id.module_id().clone(),
            transitive_edge,
            dependency: dependency.clone(),
            targets,
            root_conf: root_conf.to_string(),
            excludes,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::{
        descriptor::build_descriptor,
        model::{DependencySet, ModuleDependency, Transitivity, VersionProvider},
        resolver::{resolve_descriptor, testing::MemorySource},
    };

    fn root(dependencies: DependencySet, parameters: &ResolutionParameters) -> ModuleDescriptor {
        build_descriptor(&"acme:app:1.0".parse().unwrap(), &dependencies, parameters)
    }

    fn dependency(text: &str) -> ModuleDependency {
        text.parse().unwrap()
    }

    fn id(text: &str) -> ModuleId {
        text.parse().unwrap()
    }

    /// root -> a:1 -> c:1 and root -> b:1 -> c:2
    fn scenario() -> MemorySource {
        MemorySource::default()
            .module("acme:a:1.0", &["acme:c:1.0"])
            .module("acme:b:1.0", &["acme:c:2.0"])
            .module("acme:c:1.0", &["acme:d:1.0"])
            .module("acme:c:2.0", &[])
            .module("acme:d:1.0", &[])
    }

    #[test]
    fn latest_version_evicts_older() {
        let parameters = ResolutionParameters {
            conflict_strategy: ConflictStrategy::LatestVersion,
            ..ResolutionParameters::default()
        };
        let dependencies = DependencySet::new()
            .and(dependency("acme:a:1.0"))
            .and(dependency("acme:b:1.0"));
        let result = resolve_descriptor(&root(dependencies, &parameters), &parameters, &scenario());

        assert!(result.report.is_fine());
        assert_eq!(
            result.tree.to_strings(),
            vec![
                "Root",
                "    acme:a:1.0 (declared 1.0 [default])",
                "        acme:c:1.0 (declared 1.0 [default]) (evicted)",
                "    acme:b:1.0 (declared 1.0 [default])",
                "        acme:c:2.0 (declared 2.0 [default])",
            ]
        );
        assert_eq!(result.version_of(&id("acme:c")).unwrap().as_str(), "2.0");
        assert!(!result.contains(&id("acme:d")));
        assert_eq!(
            result.files(),
            vec![
                PathBuf::from("/repo/a-1.0.jar"),
                PathBuf::from("/repo/b-1.0.jar"),
                PathBuf::from("/repo/c-2.0.jar"),
            ]
        );
    }

    #[test]
    fn direct_dependency_evicted_by_transitive() {
        let parameters = ResolutionParameters {
            conflict_strategy: ConflictStrategy::LatestVersion,
            ..ResolutionParameters::default()
        };
        let source = MemorySource::default()
            .module("acme:a:1.0", &[])
            .module("acme:a:2.0", &[])
            .module("acme:b:1.0", &["acme:a:2.0"]);
        let dependencies = DependencySet::new()
            .and(dependency("acme:a:1.0"))
            .and(dependency("acme:b:1.0"));
        let result = resolve_descriptor(&root(dependencies, &parameters), &parameters, &source);

        assert!(result.report.is_fine());
        let children = &result.tree.children;
        assert_eq!(children.len(), 2);

        let direct = &children[0].info;
        assert_eq!(direct.module_id, id("acme:a"));
        assert_eq!(direct.declared_version.as_str(), "1.0");
        assert!(direct.evicted);
        assert!(direct.artifacts.is_empty());

        assert_eq!(children[1].info.module_id, id("acme:b"));
        let transitive = &children[1].children[0].info;
        assert_eq!(transitive.module_id, id("acme:a"));
        assert_eq!(transitive.resolved_version.as_str(), "2.0");
        assert!(!transitive.evicted);
        assert_eq!(transitive.artifacts, vec![PathBuf::from("/repo/a-2.0.jar")]);
        assert_eq!(result.version_of(&id("acme:a")).unwrap().as_str(), "2.0");
    }

    #[test]
    fn strict_reports_conflict() {
        let parameters = ResolutionParameters {
            conflict_strategy: ConflictStrategy::Strict,
            ..ResolutionParameters::default()
        };
        let dependencies = DependencySet::new()
            .and(dependency("acme:a:1.0"))
            .and(dependency("acme:b:1.0"));
        let result = resolve_descriptor(&root(dependencies, &parameters), &parameters, &scenario());

        assert_eq!(result.report.problems().len(), 1);
        let problem = &result.report.problems()[0];
        assert_eq!(problem.module_id, id("acme:c"));
        assert_eq!(problem.revision.as_str(), "2.0");
        assert_eq!(
            problem.message,
            "Conflicting versions requested for acme:c: 1.0, 2.0"
        );
    }

    #[test]
    fn override_is_absolute_for_transitive_edges() {
        let parameters = ResolutionParameters::default();
        let dependencies = DependencySet::new()
            .and(dependency("acme:a:1.0"))
            .with_version_provider(
                VersionProvider::new()
                    .with(id("acme:c"), Version::new("2.0").unwrap())
                    .with(id("acme:a"), Version::new("9.9").unwrap()),
            );
        let result = resolve_descriptor(&root(dependencies, &parameters), &parameters, &scenario());

        assert!(result.report.is_fine());
        assert_eq!(result.version_of(&id("acme:a")).unwrap().as_str(), "1.0");
        assert_eq!(result.version_of(&id("acme:c")).unwrap().as_str(), "2.0");
        let c = result.tree.find(&id("acme:c")).unwrap();
        assert_eq!(c.info.declared_version.as_str(), "1.0");
        assert!(c.children.is_empty());
    }

    #[test]
    fn no_duplicate_siblings() {
        let parameters = ResolutionParameters::default();
        let source = MemorySource::default()
            .module("acme:a:1.0", &["acme:c:1.0", "acme:c:2.0"])
            .module("acme:c:1.0", &[])
            .module("acme:c:2.0", &[]);
        let dependencies = DependencySet::new()
            .and(dependency("acme:a:1.0").with_scope("compile"))
            .and(dependency("acme:a:1.0").with_scope("runtime"));
        let result = resolve_descriptor(&root(dependencies, &parameters), &parameters, &source);

        assert_eq!(result.tree.children.len(), 1);
        let a = &result.tree.children[0];
        assert_eq!(a.children.len(), 1);
        assert_eq!(
            a.info.root_confs,
            BTreeSet::from(["compile".to_string(), "runtime".to_string()])
        );
    }

    #[test]
    fn excluded_modules_are_left_out() {
        let parameters = ResolutionParameters::default();
        let dependencies = DependencySet::new()
            .and(dependency("acme:a:1.0").excluding("acme:c".parse().unwrap()))
            .and(dependency("acme:b:1.0"))
            .with_global_exclusion("acme:d".parse().unwrap());
        let result = resolve_descriptor(&root(dependencies, &parameters), &parameters, &scenario());

        assert!(result.report.is_fine());
        assert!(result.tree.children_of(&id("acme:a")).is_empty());
        assert_eq!(result.version_of(&id("acme:c")).unwrap().as_str(), "2.0");
    }

    #[test]
    fn dynamic_versions_pick_the_highest_match() {
        let parameters = ResolutionParameters::default();
        let source = MemorySource::default()
            .module("acme:c:1.0", &[])
            .module("acme:c:1.10", &[])
            .module("acme:c:2.0", &[]);
        let dependencies = DependencySet::new()
            .and(dependency("acme:c:1.+"))
            .and(dependency("acme:x:[3.0,)"));
        let result = resolve_descriptor(&root(dependencies, &parameters), &parameters, &source);

        assert_eq!(result.version_of(&id("acme:c")).unwrap().as_str(), "1.10");
        assert_eq!(
            result.report.to_string(),
            "Error with dependencies:\n    acme:x:[3.0,): No version of acme:x matches [3.0,)"
        );
    }

    #[test]
    fn problems_are_reported_per_node() {
        let parameters = ResolutionParameters::default();
        let mut source = MemorySource::default()
            .module("acme:a:1.0", &["acme:missing:1.0"])
            .module("acme:b:1.0", &[]);
        source
            .broken_artifacts
            .push("acme:b:1.0".parse().unwrap());
        let dependencies = DependencySet::new()
            .and(dependency("acme:a:1.0"))
            .and(dependency("acme:b:1.0"));
        let result = resolve_descriptor(&root(dependencies, &parameters), &parameters, &source);

        assert_eq!(
            result.report.to_string(),
            "Error with dependencies:\n    acme:b:1.0: Download of acme:b:1.0 failed\n    acme:missing:1.0: Module acme:missing:1.0 not found in any repository"
        );
        assert_eq!(result.files(), vec![PathBuf::from("/repo/a-1.0.jar")]);
    }

    #[test]
    fn cycles_terminate() {
        let parameters = ResolutionParameters::default();
        let source = MemorySource::default()
            .module("acme:a:1.0", &["acme:b:1.0"])
            .module("acme:b:1.0", &["acme:a:1.0"]);
        let dependencies = DependencySet::new().and(dependency("acme:a:1.0"));
        let result = resolve_descriptor(&root(dependencies, &parameters), &parameters, &source);

        assert!(result.report.is_fine());
        assert_eq!(result.files().len(), 2);
    }

    #[test]
    fn non_transitive_dependencies_stop_the_walk() {
        let parameters = ResolutionParameters::default();
        let dependencies = DependencySet::new().and(
            dependency("acme:a:1.0")
                .with_mapping("default->default".parse().unwrap())
                .with_transitivity(Transitivity::None),
        );
        let result = resolve_descriptor(&root(dependencies, &parameters), &parameters, &scenario());

        assert!(result.report.is_fine());
        assert!(result.contains(&id("acme:a")));
        assert!(!result.contains(&id("acme:c")));
    }
}
