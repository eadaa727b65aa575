use std::{
    fmt::{self, Display},
    path::PathBuf,
};

use crate::{
    model::{ModuleId, Version},
    resolver::ResolveError,
    tree::{FlatNode, ResolvedDependencyNode},
};

/// A module that could not be resolved properly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDepProblem {
    pub module_id: ModuleId,
    pub revision: Version,
    pub message: String,
}

impl Display for ModuleDepProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.module_id, self.revision, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorReport {
    problems: Vec<ModuleDepProblem>,
}

impl ErrorReport {
    pub fn all_fine() -> Self {
        Self::default()
    }

    /// One problem per failed node. Blacklisted and evicted nodes never fail.
    pub fn from_nodes(nodes: &[FlatNode]) -> Self {
        let mut report = ErrorReport::all_fine();
        for node in nodes.iter().filter(|node| node.is_failed()) {
            report.add(ModuleDepProblem {
                module_id: node.info.module_id.clone(),
                revision: node.info.resolved_version.clone(),
                message: node.problems.join("; "),
            });
        }
        report
    }

    pub fn is_fine(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn problems(&self) -> &[ModuleDepProblem] {
        &self.problems
    }

    pub fn add(&mut self, problem: ModuleDepProblem) {
        if !self.problems.contains(&problem) {
            self.problems.push(problem);
        }
    }

    pub fn merge(mut self, other: ErrorReport) -> Self {
        for problem in other.problems {
            self.add(problem);
        }
        self
    }
}

impl Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fine() {
            return f.write_str("No errors with dependencies");
        }
        f.write_str("Error with dependencies:")?;
        for problem in &self.problems {
            write!(f, "\n    {}", problem)?;
        }
        Ok(())
    }
}

/// The outcome of a resolution: the tree and whatever went wrong on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveResult {
    pub tree: ResolvedDependencyNode,
    pub report: ErrorReport,
}

impl ResolveResult {
    pub fn files(&self) -> Vec<PathBuf> {
        self.tree.files()
    }

    pub fn files_for(&self, module_id: &ModuleId) -> Vec<PathBuf> {
        self.tree.files_of(module_id)
    }

    pub fn contains(&self, module_id: &ModuleId) -> bool {
        self.tree.contains(module_id)
    }

    pub fn version_of(&self, module_id: &ModuleId) -> Option<Version> {
        self.tree.version_of(module_id)
    }

    pub fn merge(self, other: ResolveResult) -> ResolveResult {
        ResolveResult {
            tree: self.tree.with_merging(other.tree),
            report: self.report.merge(other.report),
        }
    }

    /// Turns a failing report into an error.
    pub fn assert_no_error(self) -> Result<ResolveResult, ResolveError> {
        if self.report.is_fine() {
            Ok(self)
        } else {
            Err(ResolveError::Dependencies(self.report))
        }
    }
}
