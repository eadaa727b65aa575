use std::fmt::Write;

use log::warn;
use serde::Deserialize;

use crate::model::{ModuleId, Version, VersionComparator};

/// How the engine picks one version when several are requested for the same module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Leave the engine's own behaviour, which is latest version wins.
    #[default]
    Default,
    /// Any disagreement between requested versions is reported.
    Strict,
    /// The latest version satisfying every request wins.
    LatestCompatible,
    /// The latest requested version wins.
    LatestVersion,
}

/// A version requested for a module: the constraint as declared after mediation,
/// and the concrete version it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRequest {
    pub constraint: Version,
    pub resolved: Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub winner: Version,
    pub conflict: Option<String>,
}

impl ConflictStrategy {
    /// The strategy to record on a module descriptor, if any.
    pub fn bound(self) -> Option<ConflictStrategy> {
        (self != ConflictStrategy::Default).then_some(self)
    }

    pub fn select(
        &self,
        module_id: &ModuleId,
        requests: &[VersionRequest],
        comparator: VersionComparator,
    ) -> Option<Selection> {
        let mut candidates: Vec<&Version> = Vec::new();
        for request in requests {
            if !candidates.contains(&&request.resolved) {
                candidates.push(&request.resolved);
            }
        }
        let highest = comparator.max(candidates.iter().copied())?.clone();
        if candidates.len() == 1 {
            return Some(Selection {
                winner: highest,
                conflict: None,
            });
        }

        let selection = match self {
            ConflictStrategy::Default | ConflictStrategy::LatestVersion => Selection {
                winner: highest,
                conflict: None,
            },
            ConflictStrategy::Strict => Selection {
                conflict: Some(conflict_message(module_id, &candidates)),
                winner: highest,
            },
            ConflictStrategy::LatestCompatible => {
                let compatible = candidates
                    .iter()
                    .copied()
                    .filter(|candidate| {
                        requests.iter().all(|request| {
                            request
                                .constraint
                                .accepts(candidate, comparator)
                                .unwrap_or(false)
                        })
                    })
                    .collect::<Vec<_>>();
                match comparator.max(compatible) {
                    Some(winner) => Selection {
                        winner: winner.clone(),
                        conflict: None,
                    },
                    None => Selection {
                        conflict: Some(conflict_message(module_id, &candidates)),
                        winner: highest,
                    },
                }
            }
        };
        if let Some(conflict) = &selection.conflict {
            warn!("{}", conflict);
        }
        Some(selection)
    }
}

fn conflict_message(module_id: &ModuleId, candidates: &[&Version]) -> String {
    let mut message = format!("Conflicting versions requested for {}:", module_id);
    for (index, candidate) in candidates.iter().enumerate() {
        let separator = if index == 0 { " " } else { ", " };
        let _ = write!(message, "{}{}", separator, candidate);
    }
    message
}
