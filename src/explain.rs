//! Human-readable explanations of unsatisfiable requests.
//!
//! The solver's reason list is decoded once when the report is built; all
//! formatting (chain unrolling, joining, indentation) happens in the
//! [`std::fmt::Display`] impl, so the cost of rendering is only paid when
//! the caller actually shows the report to the user.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use ahash::{HashMap, HashMapExt};
use itertools::Itertools;

use crate::cudf::{CudfAtom, CudfPackage, Reason, is_synthetic};
use crate::encoder::{Table, unescape_name};
use crate::model::Universe;

/// Identity of a reason vertex: escaped name plus integer version.
type NodeKey = (String, u32);

#[derive(Debug)]
struct NodeInfo {
    display: String,
    synthetic: bool,
}

/// A lazily rendered explanation of why a request cannot be satisfied.
#[derive(Debug)]
pub struct ConflictReport {
    conflicts: Vec<(String, String)>,
    missing: Vec<(String, String)>,
    deps: Vec<(NodeKey, Vec<NodeKey>)>,
    nodes: HashMap<NodeKey, NodeInfo>,
}

impl ConflictReport {
    pub(crate) fn new(reasons: &[Reason], table: &Table, universe: &Universe) -> Self {
        let mut report = ConflictReport {
            conflicts: Vec::new(),
            missing: Vec::new(),
            deps: Vec::new(),
            nodes: HashMap::new(),
        };
        for reason in reasons {
            match reason {
                Reason::Conflict(left, right, _clause) => {
                    report
                        .conflicts
                        .push((display_package(left, table), display_package(right, table)));
                }
                Reason::Missing(pkg, clause) => {
                    report.missing.push((
                        display_package(pkg, table),
                        display_clause(pkg, clause, table, universe),
                    ));
                }
                Reason::Dependency(parent, _clause, candidates) => {
                    let parent_key = report.intern(parent, table);
                    let children = candidates
                        .iter()
                        .map(|candidate| report.intern(candidate, table))
                        .collect();
                    report.deps.push((parent_key, children));
                }
            }
        }
        report
    }

    fn intern(&mut self, pkg: &CudfPackage, table: &Table) -> NodeKey {
        let key = (pkg.name.clone(), pkg.version);
        self.nodes.entry(key.clone()).or_insert_with(|| NodeInfo {
            display: display_package(pkg, table),
            synthetic: is_synthetic(&unescape_name(&pkg.name).unwrap_or_else(|_| pkg.name.clone())),
        });
        key
    }

    /// The dependency chains of the report, root to leaf, with the
    /// synthetic request vertex filtered out. Each element is the rendered
    /// form of one package.
    pub fn chains(&self) -> Vec<Vec<String>> {
        let Some((root, _)) = self.deps.first() else {
            return Vec::new();
        };
        let mut children: HashMap<&NodeKey, Vec<&NodeKey>> = HashMap::new();
        for (parent, kids) in &self.deps {
            children.entry(parent).or_default().extend(kids.iter());
        }

        let mut chains = Vec::new();
        let mut path = vec![root];
        self.walk(&children, &mut path, &mut chains);
        chains
    }

    fn walk<'a>(
        &'a self,
        children: &HashMap<&'a NodeKey, Vec<&'a NodeKey>>,
        path: &mut Vec<&'a NodeKey>,
        chains: &mut Vec<Vec<String>>,
    ) {
        let here = *path.last().expect("path never empty");
        let next: Vec<&NodeKey> = children
            .get(here)
            .into_iter()
            .flatten()
            .filter(|key| !path.contains(*key))
            .copied()
            .collect();
        if next.is_empty() {
            // A root-to-leaf path; single-element chains carry no
            // information and are dropped before display filtering.
            if path.len() > 1 {
                let rendered: Vec<String> = path
                    .iter()
                    .filter(|key| !self.nodes[**key].synthetic)
                    .map(|key| self.nodes[*key].display.clone())
                    .collect();
                if !rendered.is_empty() && !chains.contains(&rendered) {
                    chains.push(rendered);
                }
            }
            return;
        }
        for key in next {
            path.push(key);
            self.walk(children, path, chains);
            path.pop();
        }
    }
}

fn display_package(pkg: &CudfPackage, table: &Table) -> String {
    let name = unescape_name(&pkg.name).unwrap_or_else(|_| pkg.name.clone());
    if is_synthetic(&name) {
        return "the request".to_string();
    }
    match table.decode_version(&name, pkg.version) {
        Ok(version) => format!("{name}={version}"),
        Err(_) => format!("{name}={}", pkg.version),
    }
}

/// Renders an unmet clause. Strict decoding is preferred; when an atom's
/// constraint was rounded away during encoding, the clause is recovered
/// from the owning package's original dependency formula instead.
fn display_clause(
    owner: &CudfPackage,
    clause: &[CudfAtom],
    table: &Table,
    universe: &Universe,
) -> String {
    let decoded: Result<Vec<_>, _> = clause.iter().map(|atom| table.decode_atom(atom)).collect();
    if let Ok(atoms) = decoded {
        return atoms.iter().map(ToString::to_string).join(" | ");
    }

    let names: BTreeSet<String> = clause
        .iter()
        .map(|atom| unescape_name(&atom.name).unwrap_or_else(|_| atom.name.clone()))
        .collect();
    let original = unescape_name(&owner.name)
        .ok()
        .and_then(|name| {
            let version = table.decode_version(&name, owner.version).ok()?.clone();
            universe.lookup(&crate::model::PkgId { name, version })
        })
        .and_then(|pkg| {
            pkg.depends
                .iter()
                .chain(pkg.depopts.iter())
                .find(|candidate| {
                    candidate
                        .iter()
                        .map(|atom| atom.name.clone())
                        .collect::<BTreeSet<_>>()
                        == names
                })
        });
    match original {
        Some(clause) => clause.iter().map(ToString::to_string).join(" | "),
        None => clause
            .iter()
            .map(|atom| table.decode_atom_lossy(atom).to_string())
            .join(" | "),
    }
}

impl Display for ConflictReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "The request cannot be satisfied:")?;
        for (left, right) in &self.conflicts {
            writeln!(f, "  - {left} is in conflict with {right}")?;
        }
        for (pkg, clause) in &self.missing {
            writeln!(f, "  - {pkg} is missing a candidate for {clause}")?;
        }
        let chains = self.chains();
        if !chains.is_empty() {
            writeln!(f, "The following dependency chains explain the failure:")?;
            for chain in chains {
                writeln!(f, "  - {}", chain.join(" <- "))?;
            }
        }
        Ok(())
    }
}
