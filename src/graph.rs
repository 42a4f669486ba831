//! Dependency graphs over a universe.
//!
//! A [`DepGraph`] has a vertex per package and an edge `a → b` when some
//! clause of `a`'s dependencies can be satisfied by `b`. Optional
//! dependencies contribute their own edge kind so that later passes can
//! tell the two apart. All orderings produced here are deterministic:
//! vertices are inserted in `PkgId` order and the topological sort breaks
//! ties the same way.

use std::collections::BTreeSet;
use std::io;

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use petgraph::{
    Direction,
    algo::{DfsSpace, has_path_connecting},
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};

use crate::model::{Package, PackageSet, PkgId, Universe};

/// The kind of dependency an edge represents.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DepKind {
    /// A hard dependency.
    Hard,
    /// An optional dependency (depopt).
    Optional,
}

/// A directed dependency graph over a set of packages.
pub struct DepGraph {
    graph: DiGraph<PkgId, DepKind>,
    index: HashMap<PkgId, NodeIndex>,
}

impl DepGraph {
    fn empty() -> Self {
        DepGraph {
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }

    fn ensure_node(&mut self, id: PkgId) -> NodeIndex {
        if let Some(&nx) = self.index.get(&id) {
            return nx;
        }
        let nx = self.graph.add_node(id.clone());
        self.index.insert(id, nx);
        nx
    }

    /// Builds the graph over `members`. Edges run from dependent to
    /// dependency; `with_depopts` adds [`DepKind::Optional`] edges for
    /// optional dependencies that are not already hard ones.
    pub fn build<'a>(
        members: impl IntoIterator<Item = &'a Package>,
        with_depopts: bool,
    ) -> DepGraph {
        let mut members: Vec<&Package> = members.into_iter().collect();
        members.sort_by_key(|p| p.id());

        let mut by_name: HashMap<&str, Vec<&Package>> = HashMap::new();
        for pkg in &members {
            by_name.entry(pkg.name.as_str()).or_default().push(pkg);
        }

        let mut out = DepGraph::empty();
        for pkg in &members {
            out.ensure_node(pkg.id());
        }
        for pkg in &members {
            let from = out.index[&pkg.id()];
            let mut link = |clauses: &[Vec<crate::model::Atom>], kind: DepKind| {
                for clause in clauses {
                    for atom in clause {
                        if atom.name == pkg.name {
                            continue;
                        }
                        let Some(candidates) = by_name.get(atom.name.as_str()) else {
                            continue;
                        };
                        for candidate in candidates {
                            if !atom.matches_version(&candidate.version) {
                                continue;
                            }
                            let to = out.index[&candidate.id()];
                            if out.graph.find_edge(from, to).is_none() {
                                out.graph.add_edge(from, to, kind);
                            }
                        }
                    }
                }
            };
            link(&pkg.depends, DepKind::Hard);
            if with_depopts {
                link(&pkg.depopts, DepKind::Optional);
            }
        }
        out
    }

    /// Removes every edge implied by a longer path. Sound for acyclic
    /// graphs, which dependency graphs are once a solution exists.
    pub fn transitive_reduction(&mut self) {
        let mut space = DfsSpace::new(&self.graph);
        let mut redundant = HashSet::new();
        for u in self.graph.node_indices() {
            let successors: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(u, Direction::Outgoing)
                .collect();
            for edge in self.graph.edges_directed(u, Direction::Outgoing) {
                let v = edge.target();
                if successors
                    .iter()
                    .any(|&w| w != v && has_path_connecting(&self.graph, w, v, Some(&mut space)))
                {
                    redundant.insert(edge.id());
                }
            }
        }
        self.graph.retain_edges(|_, e| !redundant.contains(&e));
    }

    /// A copy with every edge reversed, so edges run from dependency to
    /// dependent.
    pub fn mirrored(&self) -> DepGraph {
        let mut out = DepGraph::empty();
        for nx in self.graph.node_indices() {
            out.ensure_node(self.graph[nx].clone());
        }
        for edge in self.graph.edge_references() {
            let source = out.index[&self.graph[edge.source()]];
            let target = out.index[&self.graph[edge.target()]];
            out.graph.add_edge(target, source, *edge.weight());
        }
        out
    }

    /// A copy keeping only the vertices `keep` accepts, with the edges
    /// between them.
    pub fn restrict(&self, mut keep: impl FnMut(&PkgId) -> bool) -> DepGraph {
        let mut out = DepGraph::empty();
        for nx in self.graph.node_indices() {
            let id = &self.graph[nx];
            if keep(id) {
                out.ensure_node(id.clone());
            }
        }
        for edge in self.graph.edge_references() {
            let source = &self.graph[edge.source()];
            let target = &self.graph[edge.target()];
            if let (Some(&s), Some(&t)) = (out.index.get(source), out.index.get(target)) {
                out.graph.add_edge(s, t, *edge.weight());
            }
        }
        out
    }

    /// Deterministic topological order: every edge's source precedes its
    /// target, ties broken by `PkgId`. Vertices on a cycle (which a valid
    /// solution never produces) are appended in id order.
    pub fn topo(&self) -> Vec<PkgId> {
        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        for nx in self.graph.node_indices() {
            in_degree.insert(
                nx,
                self.graph.edges_directed(nx, Direction::Incoming).count(),
            );
        }
        let mut ready: BTreeSet<(PkgId, NodeIndex)> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&nx, _)| (self.graph[nx].clone(), nx))
            .collect();
        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut placed = HashSet::new();
        while let Some((id, nx)) = ready.pop_first() {
            placed.insert(nx);
            order.push(id);
            for succ in self.graph.neighbors_directed(nx, Direction::Outgoing) {
                let degree = in_degree.get_mut(&succ).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    ready.insert((self.graph[succ].clone(), succ));
                }
            }
        }
        if order.len() < self.graph.node_count() {
            let mut rest: Vec<PkgId> = self
                .graph
                .node_indices()
                .filter(|nx| !placed.contains(nx))
                .map(|nx| self.graph[nx].clone())
                .collect();
            rest.sort();
            order.extend(rest);
        }
        order
    }

    /// Whether the graph has a vertex for `id`.
    pub fn contains(&self, id: &PkgId) -> bool {
        self.index.contains_key(id)
    }

    /// The direct dependencies of `id` with their edge kinds.
    pub fn successors<'a>(&'a self, id: &PkgId) -> impl Iterator<Item = (&'a PkgId, DepKind)> {
        self.index
            .get(id)
            .into_iter()
            .flat_map(|&nx| self.graph.edges_directed(nx, Direction::Outgoing))
            .map(|edge| (&self.graph[edge.target()], *edge.weight()))
    }

    /// All edges as `(source, target, kind)`.
    pub fn edges(&self) -> impl Iterator<Item = (&PkgId, &PkgId, DepKind)> {
        self.graph
            .edge_references()
            .map(|edge| (&self.graph[edge.source()], &self.graph[edge.target()], *edge.weight()))
    }

    /// All vertex ids.
    pub fn node_ids(&self) -> impl Iterator<Item = &PkgId> {
        self.graph.node_indices().map(|nx| &self.graph[nx])
    }

    /// Number of vertices.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Writes the graph in graphviz format. Optional edges are dashed.
    pub fn write_dot(&self, f: &mut impl io::Write) -> io::Result<()> {
        write!(f, "digraph {{")?;
        for edge in self.graph.edge_references() {
            let style = match edge.weight() {
                DepKind::Hard => "solid",
                DepKind::Optional => "dashed",
            };
            write!(
                f,
                "\"{}\" -> \"{}\"[style={style}];",
                self.graph[edge.source()],
                self.graph[edge.target()]
            )?;
        }
        for nx in self.graph.node_indices() {
            let isolated = self
                .graph
                .edges_directed(nx, Direction::Incoming)
                .next()
                .is_none()
                && self
                    .graph
                    .edges_directed(nx, Direction::Outgoing)
                    .next()
                    .is_none();
            if isolated {
                write!(f, "\"{}\";", self.graph[nx])?;
            }
        }
        write!(f, "}}")
    }
}

fn filter_dependencies(
    universe: &Universe,
    subset: &PackageSet,
    direction: Direction,
) -> Vec<Package> {
    let mut graph = DepGraph::build(universe.iter(), false);
    graph.transitive_reduction();

    let mut reachable: HashSet<NodeIndex> = HashSet::new();
    let mut stack: Vec<NodeIndex> = subset
        .iter()
        .filter_map(|id| graph.index.get(id).copied())
        .collect();
    reachable.extend(stack.iter().copied());
    while let Some(nx) = stack.pop() {
        for next in graph.graph.neighbors_directed(nx, direction) {
            if reachable.insert(next) {
                stack.push(next);
            }
        }
    }

    graph
        .topo()
        .into_iter()
        .filter(|id| reachable.contains(&graph.index[id]))
        .filter_map(|id| universe.lookup(&id).cloned())
        .collect()
}

/// The packages reachable from `subset` by walking dependency edges
/// backward (towards dependents), topologically ordered.
pub fn filter_backward_dependencies(universe: &Universe, subset: &PackageSet) -> Vec<Package> {
    filter_dependencies(universe, subset, Direction::Incoming)
}

/// The packages reachable from `subset` by walking dependency edges
/// forward (towards dependencies), topologically ordered.
pub fn filter_forward_dependencies(universe: &Universe, subset: &PackageSet) -> Vec<Package> {
    filter_dependencies(universe, subset, Direction::Outgoing)
}
