//! Set difference between the current and target universes.
//!
//! Compares the installed projections of the two universes per package name
//! and emits one raw internal action per name that differs. `Recompile` is
//! never produced here; it is introduced by the action-graph builder after
//! dependency analysis.

use std::collections::BTreeMap;

use crate::model::{Package, Universe};

/// An intermediate action inside the diff/optimization pipeline.
#[derive(Debug, Clone)]
pub enum InternalAction {
    /// Install or replace: `from` is the currently installed version, if
    /// any, and `to` the version to end up with.
    Change {
        /// Currently installed version, `None` for a fresh install.
        from: Option<Package>,
        /// Version to install.
        to: Package,
    },
    /// Remove the package entirely.
    Delete(Package),
    /// Rebuild the package at its current version.
    Recompile(Package),
}

impl InternalAction {
    /// The package name the action applies to.
    pub fn name(&self) -> &str {
        match self {
            InternalAction::Change { to, .. } => &to.name,
            InternalAction::Delete(pkg) | InternalAction::Recompile(pkg) => &pkg.name,
        }
    }

    /// Whether the action removes a package or moves an installed one to a
    /// different version. Fresh installs and recompiles are not disruptive
    /// in this sense.
    pub fn is_disruptive(&self) -> bool {
        match self {
            InternalAction::Change { from: Some(_), .. } | InternalAction::Delete(_) => true,
            InternalAction::Change { from: None, .. } | InternalAction::Recompile(_) => false,
        }
    }
}

/// Diffs the installed projections of two universes over the same name
/// space. Output is sorted by name; no name appears twice.
pub fn diff(current: &Universe, target: &Universe) -> Vec<InternalAction> {
    let current_installed: BTreeMap<&str, &Package> = current
        .installed_packages()
        .map(|p| (p.name.as_str(), p))
        .collect();
    let target_installed: BTreeMap<&str, &Package> = target
        .installed_packages()
        .map(|p| (p.name.as_str(), p))
        .collect();

    let names: std::collections::BTreeSet<&str> = current_installed
        .keys()
        .chain(target_installed.keys())
        .copied()
        .collect();

    let mut actions = Vec::new();
    for name in names {
        match (current_installed.get(name), target_installed.get(name)) {
            (Some(cur), None) => actions.push(InternalAction::Delete((*cur).clone())),
            (None, Some(tgt)) => actions.push(InternalAction::Change {
                from: None,
                to: (*tgt).clone(),
            }),
            (Some(cur), Some(tgt)) if cur.version != tgt.version => {
                actions.push(InternalAction::Change {
                    from: Some((*cur).clone()),
                    to: (*tgt).clone(),
                })
            }
            _ => {}
        }
    }
    actions
}
