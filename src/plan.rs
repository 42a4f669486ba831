//! Action plans: the partially-ordered output of a resolution.
//!
//! A [`Plan`] is a topologically ordered removal list plus a DAG of
//! install-side actions. Edges mean "predecessor must complete before
//! successor"; executing the vertices in any topological order transitions
//! the system from its current state to the target state.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};
use std::io;

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};

use crate::diff::InternalAction;
use crate::graph::{DepGraph, DepKind};
use crate::model::{Package, PackageSet, PkgId, Universe};

/// A primitive action of the plan.
#[derive(Debug, Clone)]
pub enum Action {
    /// Install a package that has no currently installed version.
    Install {
        /// The package to install.
        to: Package,
    },
    /// Replace an installed version with a newer one.
    Upgrade {
        /// Currently installed version.
        from: Package,
        /// Version to install.
        to: Package,
    },
    /// Replace an installed version with an older one.
    Downgrade {
        /// Currently installed version.
        from: Package,
        /// Version to install.
        to: Package,
    },
    /// Rebuild a package that stays at its version but has a dependency
    /// that changes.
    Recompile {
        /// The package to rebuild.
        pkg: Package,
    },
    /// Remove a package.
    Delete {
        /// The package to remove.
        pkg: Package,
    },
}

impl Action {
    /// The package the action is about (the incoming version for
    /// replacements).
    pub fn package(&self) -> &Package {
        match self {
            Action::Install { to } | Action::Upgrade { to, .. } | Action::Downgrade { to, .. } => {
                to
            }
            Action::Recompile { pkg } | Action::Delete { pkg } => pkg,
        }
    }

    /// The package name the action applies to.
    pub fn name(&self) -> &str {
        &self.package().name
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Action::Install { to } => write!(f, "install {}", to.id()),
            Action::Upgrade { from, to } => write!(f, "upgrade {} to {}", from.id(), to.version),
            Action::Downgrade { from, to } => {
                write!(f, "downgrade {} to {}", from.id(), to.version)
            }
            Action::Recompile { pkg } => write!(f, "recompile {}", pkg.id()),
            Action::Delete { pkg } => write!(f, "remove {}", pkg.id()),
        }
    }
}

/// The DAG of install-side actions, one vertex per affected package name.
#[derive(Debug)]
pub struct ActionGraph {
    graph: DiGraph<Action, ()>,
    index: HashMap<String, NodeIndex>,
}

impl ActionGraph {
    fn new() -> Self {
        ActionGraph {
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }

    fn add(&mut self, action: Action) -> NodeIndex {
        assert!(
            !matches!(action, Action::Delete { .. }),
            "deletions belong to the removal list, not the action graph"
        );
        let name = action.name().to_string();
        assert!(
            !self.index.contains_key(&name),
            "two actions for package {name}"
        );
        let nx = self.graph.add_node(action);
        self.index.insert(name, nx);
        nx
    }

    fn connect(&mut self, from: &str, to: &str) {
        let (Some(&a), Some(&b)) = (self.index.get(from), self.index.get(to)) else {
            return;
        };
        if a != b && self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, ());
        }
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph holds no actions.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// The action for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&Action> {
        self.index.get(name).map(|&nx| &self.graph[nx])
    }

    /// Iterates over the actions in insertion order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.graph.node_indices().map(|nx| &self.graph[nx])
    }

    /// All edges as `(predecessor, successor)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&Action, &Action)> {
        self.graph
            .edge_references()
            .map(|edge| (&self.graph[edge.source()], &self.graph[edge.target()]))
    }

    /// Whether the plan orders `from` before `to` directly.
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&a), Some(&b)) => self.graph.find_edge(a, b).is_some(),
            _ => false,
        }
    }

    /// Deterministic topological order of the actions.
    pub fn topo_order(&self) -> Vec<&Action> {
        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        for nx in self.graph.node_indices() {
            in_degree.insert(
                nx,
                self.graph.edges_directed(nx, Direction::Incoming).count(),
            );
        }
        let mut ready: BTreeSet<(&str, NodeIndex)> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&nx, _)| (self.graph[nx].name(), nx))
            .collect();
        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some((_, nx)) = ready.pop_first() {
            order.push(&self.graph[nx]);
            for succ in self.graph.neighbors_directed(nx, Direction::Outgoing) {
                let degree = in_degree.get_mut(&succ).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    ready.insert((self.graph[succ].name(), succ));
                }
            }
        }
        assert_eq!(order.len(), self.graph.node_count(), "action graph has a cycle");
        order
    }

    /// Writes the graph in graphviz format.
    pub fn write_dot(&self, f: &mut impl io::Write) -> io::Result<()> {
        write!(f, "digraph {{")?;
        for edge in self.graph.edge_references() {
            write!(
                f,
                "\"{}\" -> \"{}\";",
                self.graph[edge.source()],
                self.graph[edge.target()]
            )?;
        }
        for nx in self.graph.node_indices() {
            if self.graph.neighbors_undirected(nx).next().is_none() {
                write!(f, "\"{}\";", self.graph[nx])?;
            }
        }
        write!(f, "}}")
    }
}

/// Counts of the plan's actions by category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Fresh installs.
    pub install: usize,
    /// Recompiles and same-version reinstalls.
    pub reinstall: usize,
    /// Upgrades.
    pub upgrade: usize,
    /// Downgrades.
    pub downgrade: usize,
    /// Removals.
    pub remove: usize,
}

impl Display for Stats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (count, verb) in [
            (self.install, "install"),
            (self.reinstall, "recompile"),
            (self.upgrade, "upgrade"),
            (self.downgrade, "downgrade"),
            (self.remove, "remove"),
        ] {
            if count > 0 {
                parts.push(format!("{count} to {verb}"));
            }
        }
        if parts.is_empty() {
            write!(f, "nothing to do")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// The output of a successful resolution.
#[derive(Debug)]
pub struct Plan {
    /// Packages to remove, ordered so that a package is deleted before any
    /// of its reverse dependencies that are also being deleted.
    pub to_remove: Vec<Package>,
    /// The DAG of install-side actions.
    pub to_add: ActionGraph,
}

impl Plan {
    /// Whether the plan does nothing at all.
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }

    /// True iff the plan removes a package or moves one to a different
    /// version, as opposed to only installing fresh packages or
    /// recompiling.
    pub fn delete_or_update(&self) -> bool {
        !self.to_remove.is_empty()
            || self
                .to_add
                .actions()
                .any(|a| matches!(a, Action::Upgrade { .. } | Action::Downgrade { .. }))
    }

    /// Action counts by category.
    pub fn stats(&self) -> Stats {
        let mut stats = Stats {
            remove: self.to_remove.len(),
            ..Stats::default()
        };
        for action in self.to_add.actions() {
            match action {
                Action::Install { .. } => stats.install += 1,
                Action::Upgrade { .. } => stats.upgrade += 1,
                Action::Downgrade { .. } => stats.downgrade += 1,
                Action::Recompile { .. } => stats.reinstall += 1,
                Action::Delete { .. } => stats.remove += 1,
            }
        }
        stats
    }

    /// Writes the plan listing to `w`.
    pub fn write(&self, w: &mut impl io::Write) -> io::Result<()> {
        write!(w, "{self}")
    }

    /// Prints the plan listing to stdout.
    pub fn print(&self) {
        print!("{self}");
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for pkg in &self.to_remove {
            writeln!(f, "  - remove {}", pkg.id())?;
        }
        for action in self.to_add.topo_order() {
            writeln!(f, "  - {action}")?;
        }
        Ok(())
    }
}

/// Everything the builder needs to assemble a [`Plan`].
pub(crate) struct PlanInputs<'a> {
    /// Raw actions from the diff engine.
    pub actions: Vec<InternalAction>,
    /// The universe before the operation.
    pub current: &'a Universe,
    /// The universe the solver chose.
    pub target: &'a Universe,
    /// The currently installed set.
    pub installed: &'a PackageSet,
    /// Names the user explicitly asked to remove.
    pub requested_removals: HashSet<String>,
    /// Debug dump directory, if any.
    pub dump_dir: Option<&'a std::path::Path>,
}

/// Builds the final plan from raw diff actions.
pub(crate) fn build(inputs: PlanInputs<'_>) -> Plan {
    let mut add_map: BTreeMap<String, (Option<Package>, Package)> = BTreeMap::new();
    let mut delete_map: BTreeMap<String, Package> = BTreeMap::new();
    for action in inputs.actions {
        match action {
            InternalAction::Change { from, to } => {
                add_map.insert(to.name.clone(), (from, to));
            }
            InternalAction::Delete(pkg) => {
                delete_map.insert(pkg.name.clone(), pkg);
            }
            InternalAction::Recompile(_) => {
                unreachable!("recompiles are introduced by the builder, not the diff")
            }
        }
    }
    let installed_names: HashSet<&str> = inputs
        .installed
        .iter()
        .map(|id| id.name.as_str())
        .collect();

    // Dependency graph of the target universe, reduced, then mirrored so
    // edges run from dependency to dependent.
    let mut g_install = DepGraph::build(inputs.target.installed_packages(), false);
    g_install.transitive_reduction();
    let mirrored_full = g_install.mirrored();

    // Phase A: keep the vertices that are currently installed or being
    // installed, and drop everything being deleted.
    let mirrored = mirrored_full.restrict(|id| {
        (installed_names.contains(id.name.as_str()) || add_map.contains_key(&id.name))
            && !delete_map.contains_key(&id.name)
    });

    // Phase B: fold the mirrored graph in topological order, propagating a
    // dirty set seeded with everything the diff touches. An unchanged
    // vertex whose dependencies include a dirty name must be recompiled,
    // and itself dirties its dependents.
    let mut dirty: HashSet<String> = add_map
        .keys()
        .chain(delete_map.keys())
        .cloned()
        .collect();
    let mut recompiles: Vec<Package> = Vec::new();
    for id in mirrored.topo() {
        if add_map.contains_key(&id.name) {
            continue;
        }
        let Some(current) = inputs.current.lookup(&id) else {
            continue;
        };
        let affected = current
            .depends
            .iter()
            .chain(current.depopts.iter())
            .flatten()
            .any(|atom| dirty.contains(&atom.name));
        if affected {
            dirty.insert(id.name.clone());
            recompiles.push(current.clone());
        }
    }

    // Phase C: classify the deletions over the installed-side graph, which
    // keeps its optional edges. Candidates whose only link into the
    // deletion set is optional stay installed and are recompiled instead.
    let g_simple = DepGraph::build(
        inputs
            .installed
            .iter()
            .filter_map(|id| inputs.current.lookup(id)),
        true,
    );
    let mut order: Vec<PkgId> = g_simple
        .mirrored()
        .topo()
        .into_iter()
        .filter(|id| delete_map.contains_key(&id.name))
        .collect();
    for (name, pkg) in &delete_map {
        if !order.iter().any(|id| &id.name == name) {
            order.push(pkg.id());
        }
    }

    let mut delete_mark: HashSet<String> = HashSet::new();
    let mut to_remove: Vec<Package> = Vec::new();
    for id in order {
        let pkg = &delete_map[&id.name];
        let requested = inputs.requested_removals.contains(&id.name);
        let mut hard_to_deleted = false;
        let mut any_into_candidates = false;
        for (succ, kind) in g_simple.successors(&id) {
            if delete_map.contains_key(&succ.name) {
                any_into_candidates = true;
                if kind == DepKind::Hard && delete_mark.contains(&succ.name) {
                    hard_to_deleted = true;
                }
            }
        }
        if requested || hard_to_deleted || !any_into_candidates {
            delete_mark.insert(id.name.clone());
            to_remove.push(pkg.clone());
        } else {
            tracing::debug!("rescuing {} from deletion, recompiling instead", pkg.id());
            recompiles.push(pkg.clone());
        }
    }

    // Phase D: assemble the output DAG, one vertex per surviving action,
    // then copy the install-side edges between action vertices.
    let mut to_add = ActionGraph::new();
    for (name, (from, to)) in add_map {
        // The target universe may have dropped the old version, making a
        // replacement look like a fresh install; recover the old version
        // from the installed set.
        let from = from.or_else(|| {
            inputs
                .installed
                .iter()
                .find(|id| id.name == name)
                .and_then(|id| inputs.current.lookup(id))
                .cloned()
        });
        let action = match from {
            None => Action::Install { to },
            Some(old) => match old.version.cmp(&to.version) {
                Ordering::Less => Action::Upgrade { from: old, to },
                Ordering::Greater => Action::Downgrade { from: old, to },
                Ordering::Equal => Action::Recompile { pkg: to },
            },
        };
        to_add.add(action);
    }
    for pkg in recompiles {
        to_add.add(Action::Recompile { pkg });
    }
    for (source, target, _) in mirrored_full.edges() {
        to_add.connect(&source.name, &target.name);
    }

    if let Some(dir) = inputs.dump_dir {
        crate::dump::dot(dir, "to-install.dot", &g_install);
        let g_remove = g_simple.restrict(|id| delete_mark.contains(&id.name));
        crate::dump::dot(dir, "to-remove.dot", &g_remove);
    }

    tracing::debug!(
        "plan: {} removals, {} install-side actions",
        to_remove.len(),
        to_add.len()
    );
    Plan { to_remove, to_add }
}
