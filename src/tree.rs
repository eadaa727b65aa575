//! The resolved dependency tree.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt::{self, Display},
    path::PathBuf,
};

use crate::model::{ModuleId, Version, VersionedModule};

const INDENT: &str = "    ";
const ROOT_LABEL: &str = "Root";

/// What is known about one module at one place of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNodeInfo {
    pub module_id: ModuleId,
    pub declared_version: Version,
    pub declared_confs: BTreeSet<String>,
    pub root_confs: BTreeSet<String>,
    pub resolved_version: Version,
    pub artifacts: Vec<PathBuf>,
    pub evicted: bool,
}

impl ModuleNodeInfo {
    pub fn new(module_id: ModuleId, declared_version: Version, resolved_version: Version) -> Self {
        ModuleNodeInfo {
            module_id,
            declared_version,
            declared_confs: BTreeSet::new(),
            root_confs: BTreeSet::new(),
            resolved_version,
            artifacts: Vec::new(),
            evicted: false,
        }
    }

    pub fn versioned(&self) -> VersionedModule {
        self.module_id.with_version(self.resolved_version.clone())
    }
}

impl Display for ModuleNodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let confs = self
            .declared_confs
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "{}:{} (declared {} [{}])",
            self.module_id, self.resolved_version, self.declared_version, confs
        )?;
        if self.evicted {
            f.write_str(" (evicted)")?;
        }
        Ok(())
    }
}

/// One edge found while walking the graph: `caller` depends on the module of `info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatNode {
    pub caller: ModuleId,
    pub info: ModuleNodeInfo,
    pub blacklisted: bool,
    pub problems: Vec<String>,
}

impl FlatNode {
    pub fn new(caller: ModuleId, info: ModuleNodeInfo) -> Self {
        FlatNode {
            caller,
            info,
            blacklisted: false,
            problems: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        !self.blacklisted && !self.info.evicted && !self.problems.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependencyNode {
    pub info: ModuleNodeInfo,
    pub children: Vec<ResolvedDependencyNode>,
}

/// Materialises the tree below `root` from the flat nodes of a resolution.
///
/// Blacklisted nodes are dropped. Under one caller the first node of a module wins.
/// Artifacts are taken from `artifact_index`, evicted nodes get none.
pub fn build_tree(
    flat_nodes: &[FlatNode],
    root: &VersionedModule,
    artifact_index: &BTreeMap<VersionedModule, Vec<PathBuf>>,
) -> ResolvedDependencyNode {
    let mut index: HashMap<&ModuleId, Vec<&ModuleNodeInfo>> = HashMap::new();
    for node in flat_nodes.iter().filter(|node| !node.blacklisted) {
        let children = index.entry(&node.caller).or_default();
        if !children
            .iter()
            .any(|child| child.module_id == node.info.module_id)
        {
            children.push(&node.info);
        }
    }

    let mut root_info = ModuleNodeInfo::new(
        root.module_id().clone(),
        root.version().clone(),
        root.version().clone(),
    );
    let mut path = Vec::new();
    let children = materialise_children(root.module_id(), &index, artifact_index, &mut path);
    for child in &children {
        root_info.root_confs.extend(child.info.root_confs.iter().cloned());
    }
    ResolvedDependencyNode {
        info: root_info,
        children,
    }
}

fn materialise_children(
    parent: &ModuleId,
    index: &HashMap<&ModuleId, Vec<&ModuleNodeInfo>>,
    artifact_index: &BTreeMap<VersionedModule, Vec<PathBuf>>,
    path: &mut Vec<(ModuleId, ModuleId)>,
) -> Vec<ResolvedDependencyNode> {
    let Some(infos) = index.get(parent) else {
        return Vec::new();
    };
    let mut children = Vec::with_capacity(infos.len());
    for info in infos {
        let mut info = (*info).clone();
        if !info.evicted {
            info.artifacts = artifact_index
                .get(&info.versioned())
                .cloned()
                .unwrap_or_default();
        }
        let edge = (parent.clone(), info.module_id.clone());
        let grandchildren = if info.evicted || path.contains(&edge) {
            Vec::new()
        } else {
            path.push(edge);
            let grandchildren = materialise_children(&info.module_id, index, artifact_index, path);
            path.pop();
            grandchildren
        };
        children.push(ResolvedDependencyNode {
            info,
            children: grandchildren,
        });
    }
    children
}

impl ResolvedDependencyNode {
    fn descendants_preorder(&self) -> Vec<&ResolvedDependencyNode> {
        let mut nodes = Vec::new();
        let mut pending = self.children.iter().rev().collect::<Vec<_>>();
        while let Some(node) = pending.pop() {
            nodes.push(node);
            pending.extend(node.children.iter().rev());
        }
        nodes
    }

    /// Every node below the root, depth first.
    pub fn flatten(&self) -> Vec<&ModuleNodeInfo> {
        self.descendants_preorder()
            .into_iter()
            .map(|node| &node.info)
            .collect()
    }

    /// Resolved files, without duplicates.
    pub fn files(&self) -> Vec<PathBuf> {
        self.collect_files(|_| true)
    }

    /// Resolved files of the modules reached from one configuration of the root.
    pub fn files_for(&self, root_conf: &str) -> Vec<PathBuf> {
        self.collect_files(|info| info.root_confs.contains(root_conf))
    }

    fn collect_files(&self, include: impl Fn(&ModuleNodeInfo) -> bool) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = Vec::new();
        for info in self.flatten() {
            if info.evicted || !include(info) {
                continue;
            }
            for artifact in &info.artifacts {
                if !files.contains(artifact) {
                    files.push(artifact.clone());
                }
            }
        }
        files
    }

    /// Files of one module, wherever it is in the tree.
    pub fn files_of(&self, module_id: &ModuleId) -> Vec<PathBuf> {
        self.collect_files(|info| &info.module_id == module_id)
    }

    pub fn contains(&self, module_id: &ModuleId) -> bool {
        self.flatten()
            .iter()
            .any(|info| !info.evicted && &info.module_id == module_id)
    }

    /// Versions the modules below the root resolved to. Evicted nodes are skipped.
    pub fn resolved_versions(&self) -> BTreeMap<ModuleId, Version> {
        let mut versions = BTreeMap::new();
        for info in self.flatten() {
            if !info.evicted {
                versions
                    .entry(info.module_id.clone())
                    .or_insert_with(|| info.resolved_version.clone());
            }
        }
        versions
    }

    pub fn version_of(&self, module_id: &ModuleId) -> Option<Version> {
        self.find(module_id).map(|node| node.info.resolved_version.clone())
    }

    /// Coordinates of the resolved modules below the root.
    pub fn descendants(&self) -> Vec<VersionedModule> {
        let mut modules: Vec<VersionedModule> = Vec::new();
        for info in self.flatten() {
            let versioned = info.versioned();
            if !info.evicted && !modules.contains(&versioned) {
                modules.push(versioned);
            }
        }
        modules
    }

    /// The first node of a module that was not evicted.
    pub fn find(&self, module_id: &ModuleId) -> Option<&ResolvedDependencyNode> {
        self.descendants_preorder()
            .into_iter()
            .find(|node| !node.info.evicted && &node.info.module_id == module_id)
    }

    pub fn children_of(&self, module_id: &ModuleId) -> Vec<&ResolvedDependencyNode> {
        self.find(module_id)
            .map(|node| node.children.iter().collect())
            .unwrap_or_default()
    }

    /// Combines two trees. Children of the same module are merged recursively,
    /// the rest of `other` is appended.
    pub fn with_merging(mut self, other: ResolvedDependencyNode) -> ResolvedDependencyNode {
        self.info
            .root_confs
            .extend(other.info.root_confs.iter().cloned());
        for child in other.children {
            let same = self.children.iter().position(|existing| {
                existing.info.module_id == child.info.module_id
                    && existing.info.resolved_version == child.info.resolved_version
                    && existing.info.evicted == child.info.evicted
            });
            match same {
                Some(position) => {
                    let existing = self.children.remove(position);
                    let mut merged = existing.with_merging(child.clone());
                    merged
                        .info
                        .declared_confs
                        .extend(child.info.declared_confs.iter().cloned());
                    for artifact in child.info.artifacts {
                        if !merged.info.artifacts.contains(&artifact) {
                            merged.info.artifacts.push(artifact);
                        }
                    }
                    self.children.insert(position, merged);
                }
                None => self.children.push(child),
            }
        }
        self
    }

    /// One line per node, indented by depth. A module is expanded only once.
    pub fn to_strings(&self) -> Vec<String> {
        let mut lines = vec![ROOT_LABEL.to_string()];
        let mut listed = BTreeSet::new();
        for child in &self.children {
            child.render(1, &mut listed, &mut lines);
        }
        lines
    }

    fn render(&self, depth: usize, listed: &mut BTreeSet<VersionedModule>, lines: &mut Vec<String>) {
        let line = format!("{}{}", INDENT.repeat(depth), self.info);
        if self.info.evicted {
            lines.push(line);
            return;
        }
        if !listed.insert(self.info.versioned()) {
            lines.push(format!("{} (already listed)", line));
            return;
        }
        lines.push(line);
        for child in &self.children {
            child.render(depth + 1, listed, lines);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn id(text: &str) -> ModuleId {
        text.parse().unwrap()
    }

    fn node(caller: &str, callee: &str, version: &str, root_conf: &str) -> FlatNode {
        let version = Version::new(version).unwrap();
        let mut info = ModuleNodeInfo::new(id(callee), version.clone(), version);
        info.declared_confs.insert("default".to_string());
        info.root_confs.insert(root_conf.to_string());
        FlatNode::new(id(caller), info)
    }

    fn root() -> VersionedModule {
        "acme:app:1.0".parse().unwrap()
    }

    fn artifact_index(modules: &[&str]) -> BTreeMap<VersionedModule, Vec<PathBuf>> {
        modules
            .iter()
            .map(|module| {
                let versioned: VersionedModule = module.parse().unwrap();
                let file = PathBuf::from(format!("/cache/{}.jar", versioned.module_id().name()));
                (versioned, vec![file])
            })
            .collect()
    }

    #[test]
    fn build_with_eviction() {
        let mut evicted = node("acme:a", "acme:c", "1.0", "compile");
        evicted.info.evicted = true;
        let mut blacklisted = node("acme:b", "acme:d", "1.0", "compile");
        blacklisted.blacklisted = true;
        let nodes = vec![
            node("acme:app", "acme:a", "1.0", "compile"),
            node("acme:app", "acme:b", "1.0", "runtime"),
            evicted,
            node("acme:b", "acme:c", "2.0", "runtime"),
            blacklisted,
        ];
        let index = artifact_index(&["acme:a:1.0", "acme:b:1.0", "acme:c:1.0", "acme:c:2.0"]);
        let tree = build_tree(&nodes, &root(), &index);

        assert_eq!(
            tree.to_strings(),
            vec![
                "Root",
                "    acme:a:1.0 (declared 1.0 [default])",
                "        acme:c:1.0 (declared 1.0 [default]) (evicted)",
                "    acme:b:1.0 (declared 1.0 [default])",
                "        acme:c:2.0 (declared 2.0 [default])",
            ]
        );
        assert_eq!(
            tree.files(),
            vec![
                PathBuf::from("/cache/a.jar"),
                PathBuf::from("/cache/b.jar"),
                PathBuf::from("/cache/c.jar"),
            ]
        );
        assert_eq!(tree.files_for("compile"), vec![PathBuf::from("/cache/a.jar")]);
        assert!(tree.contains(&id("acme:c")));
        assert!(!tree.contains(&id("acme:d")));
        assert_eq!(tree.version_of(&id("acme:c")).unwrap().as_str(), "2.0");
        assert_eq!(
            tree.resolved_versions().keys().cloned().collect::<Vec<_>>(),
            vec![id("acme:a"), id("acme:b"), id("acme:c")]
        );
        assert_eq!(
            tree.info.root_confs,
            BTreeSet::from(["compile".to_string(), "runtime".to_string()])
        );
    }

    #[test]
    fn first_sibling_wins() {
        let nodes = vec![
            node("acme:app", "acme:a", "1.0", "compile"),
            node("acme:app", "acme:a", "2.0", "compile"),
        ];
        let tree = build_tree(&nodes, &root(), &BTreeMap::new());
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].info.resolved_version.as_str(), "1.0");
    }

    #[test]
    fn cycles_end_in_leaves() {
        let nodes = vec![
            node("acme:app", "acme:a", "1.0", "default"),
            node("acme:a", "acme:b", "1.0", "default"),
            node("acme:b", "acme:a", "1.0", "default"),
        ];
        let tree = build_tree(&nodes, &root(), &BTreeMap::new());
        assert_eq!(
            tree.to_strings(),
            vec![
                "Root",
                "    acme:a:1.0 (declared 1.0 [default])",
                "        acme:b:1.0 (declared 1.0 [default])",
                "            acme:a:1.0 (declared 1.0 [default]) (already listed)",
            ]
        );
        let b = tree.children_of(&id("acme:a"));
        assert_eq!(b.len(), 1);
        assert_eq!(
            tree.descendants(),
            vec![
                "acme:a:1.0".parse::<VersionedModule>().unwrap(),
                "acme:b:1.0".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn merge_trees() {
        let first = build_tree(
            &[node("acme:app", "acme:a", "1.0", "compile")],
            &root(),
            &artifact_index(&["acme:a:1.0"]),
        );
        let second = build_tree(
            &[
                node("acme:app", "acme:a", "1.0", "test"),
                node("acme:a", "acme:x", "1.0", "test"),
                node("acme:app", "acme:b", "1.0", "test"),
            ],
            &root(),
            &artifact_index(&["acme:a:1.0", "acme:x:1.0", "acme:b:1.0"]),
        );
        let merged = first.with_merging(second);
        assert_eq!(merged.children.len(), 2);
        assert_eq!(merged.children[0].children.len(), 1);
        assert_eq!(merged.files().len(), 3);
        assert!(merged.info.root_confs.contains("test"));
    }
}
