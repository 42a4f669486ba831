//! A miniature base solver for exercising the planner.
//!
//! Deterministic backtracking over the integer-versioned model. Preferences
//! per package name, tried in order:
//!
//! - removal-requested: absent first;
//! - upgrade-requested: newest satisfying version, never below the
//!   installed one;
//! - install-requested: newest satisfying version;
//! - installed and unrequested: current version, then absent, then the
//!   other versions;
//! - otherwise: absent, then newest first.
//!
//! The first full assignment satisfying every dependency clause and
//! conflict wins, so the solver keeps installed versions wherever it can
//! and installs the newest versions of what it is forced to add. Unsat
//! requests produce a `Dependency` reason DAG rooted at the synthetic
//! `dose-dummy-request` vertex, the way external CUDF solvers report their
//! conflicts.

use std::collections::{BTreeMap, BTreeSet};

use ordino::cudf::{Answer, BaseSolver, CudfAtom, CudfPackage, CudfRequest, Preamble, Reason};

pub struct ToySolver;

type ByName<'a> = BTreeMap<&'a str, Vec<&'a CudfPackage>>;

fn matches(atom: &CudfAtom, pkg: &CudfPackage) -> bool {
    atom.name == pkg.name
        && match atom.constraint {
            None => true,
            Some((relop, bound)) => relop.accepts(pkg.version.cmp(&bound)),
        }
}

fn consistent(assignment: &[Option<&CudfPackage>]) -> bool {
    let present: Vec<&CudfPackage> = assignment.iter().flatten().copied().collect();
    for pkg in &present {
        for clause in &pkg.depends {
            if !clause
                .iter()
                .any(|atom| present.iter().any(|q| matches(atom, q)))
            {
                return false;
            }
        }
        for atom in &pkg.conflicts {
            if present
                .iter()
                .any(|q| q.name != pkg.name && matches(atom, q))
            {
                return false;
            }
        }
    }
    true
}

fn search<'a>(
    options: &[Vec<Option<&'a CudfPackage>>],
    depth: usize,
    assignment: &mut Vec<Option<&'a CudfPackage>>,
) -> bool {
    if depth == options.len() {
        return consistent(assignment);
    }
    for &choice in &options[depth] {
        assignment[depth] = choice;
        if search(options, depth + 1, assignment) {
            return true;
        }
    }
    assignment[depth] = None;
    false
}

fn unsat_reasons(by_name: &ByName<'_>, request: &CudfRequest) -> Vec<Reason> {
    let dummy = CudfPackage {
        name: "dose-dummy-request".to_string(),
        version: 1,
        installed: false,
        depends: Vec::new(),
        conflicts: Vec::new(),
        extras: BTreeMap::new(),
    };
    let mut reasons = Vec::new();
    let mut visited: BTreeSet<(String, u32)> = BTreeSet::new();
    let mut queue: Vec<&CudfPackage> = Vec::new();

    for atom in request.install.iter().chain(request.upgrade.iter()) {
        let candidates: Vec<&CudfPackage> = by_name
            .get(atom.name.as_str())
            .into_iter()
            .flatten()
            .copied()
            .collect();
        reasons.push(Reason::Dependency(
            dummy.clone(),
            vec![atom.clone()],
            candidates.iter().map(|p| (*p).clone()).collect(),
        ));
        for pkg in candidates {
            if visited.insert((pkg.name.clone(), pkg.version)) {
                queue.push(pkg);
            }
        }
    }

    while let Some(pkg) = queue.pop() {
        for clause in &pkg.depends {
            let candidates: Vec<&CudfPackage> = clause
                .iter()
                .flat_map(|atom| by_name.get(atom.name.as_str()).into_iter().flatten())
                .copied()
                .collect();
            let satisfiable = clause
                .iter()
                .any(|atom| candidates.iter().any(|p| matches(atom, p)));
            if !satisfiable {
                reasons.push(Reason::Missing(pkg.clone(), clause.clone()));
            }
            if !candidates.is_empty() {
                reasons.push(Reason::Dependency(
                    pkg.clone(),
                    clause.clone(),
                    candidates.iter().map(|p| (*p).clone()).collect(),
                ));
                for candidate in candidates {
                    if visited.insert((candidate.name.clone(), candidate.version)) {
                        queue.push(candidate);
                    }
                }
            }
        }
        for atom in &pkg.conflicts {
            for other in by_name.get(atom.name.as_str()).into_iter().flatten() {
                if other.name != pkg.name && matches(atom, other) {
                    reasons.push(Reason::Conflict(
                        pkg.clone(),
                        (*other).clone(),
                        Some(atom.clone()),
                    ));
                }
            }
        }
    }
    reasons
}

impl BaseSolver for ToySolver {
    fn check_request(
        &self,
        _preamble: &Preamble,
        universe: &[CudfPackage],
        request: &CudfRequest,
    ) -> Answer {
        let mut by_name: ByName = BTreeMap::new();
        for pkg in universe {
            by_name.entry(&pkg.name).or_default().push(pkg);
        }
        for versions in by_name.values_mut() {
            versions.sort_by_key(|p| p.version);
        }

        let mut options: Vec<Vec<Option<&CudfPackage>>> = Vec::new();
        for (name, versions) in &by_name {
            let installed = versions.iter().find(|p| p.installed).copied();
            let for_name = |atoms: &[CudfAtom]| -> Vec<CudfAtom> {
                atoms.iter().filter(|a| a.name == **name).cloned().collect()
            };
            let install_atoms = for_name(&request.install);
            let remove_atoms = for_name(&request.remove);
            let upgrade_atoms = for_name(&request.upgrade);

            let mut opts: Vec<Option<&CudfPackage>> = Vec::new();
            if !remove_atoms.is_empty() {
                opts.push(None);
                for pkg in versions.iter().rev() {
                    if !remove_atoms.iter().any(|a| matches(a, pkg)) {
                        opts.push(Some(*pkg));
                    }
                }
            } else if !upgrade_atoms.is_empty() {
                for pkg in versions.iter().rev() {
                    let acceptable = upgrade_atoms.iter().all(|a| matches(a, pkg))
                        && installed.map_or(true, |cur| pkg.version >= cur.version);
                    if acceptable {
                        opts.push(Some(*pkg));
                    }
                }
            } else if !install_atoms.is_empty() {
                for pkg in versions.iter().rev() {
                    if install_atoms.iter().all(|a| matches(a, pkg)) {
                        opts.push(Some(*pkg));
                    }
                }
            } else if let Some(cur) = installed {
                opts.push(Some(cur));
                opts.push(None);
                for pkg in versions.iter().rev() {
                    if pkg.version != cur.version {
                        opts.push(Some(*pkg));
                    }
                }
            } else {
                opts.push(None);
                for pkg in versions.iter().rev() {
                    opts.push(Some(*pkg));
                }
            }
            if opts.is_empty() {
                return Answer::Unsat(unsat_reasons(&by_name, request));
            }
            options.push(opts);
        }

        let mut assignment: Vec<Option<&CudfPackage>> = vec![None; options.len()];
        if search(&options, 0, &mut assignment) {
            let chosen: BTreeMap<&str, u32> = assignment
                .iter()
                .flatten()
                .map(|p| (p.name.as_str(), p.version))
                .collect();
            let result = universe
                .iter()
                .map(|pkg| CudfPackage {
                    installed: chosen.get(pkg.name.as_str()) == Some(&pkg.version),
                    ..pkg.clone()
                })
                .collect();
            Answer::Sat(result)
        } else {
            Answer::Unsat(unsat_reasons(&by_name, request))
        }
    }
}
