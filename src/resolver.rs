//! The planner: end-to-end resolution from request to action plan.
//!
//! [`Planner::resolve`] encodes the universe, runs the base solver, and
//! turns the answer into a [`Plan`] (or a [`ConflictReport`]). When the
//! request installs something, a second, minimizing pass reprobes the
//! solver to bias the outcome toward "install the newest versions of what
//! was asked for, touch nothing else". The whole pipeline is pure: the
//! same inputs give the same plan, and no state survives a call.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ahash::{HashSet, HashSetExt};
use thiserror::Error;

use crate::cudf::{Answer, BaseSolver, CudfPackage, CudfRequest, DEPOPTS_PROPERTY, Preamble};
use crate::diff::{self, InternalAction};
use crate::dump;
use crate::encoder::{EncodeError, Table};
use crate::explain::ConflictReport;
use crate::graph::{self, DepGraph};
use crate::model::{Atom, PackageSet, Relop, Request, Universe};
use crate::plan::{self, Plan};

/// Why a resolution did not produce a plan.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The request cannot be satisfied; the report renders lazily.
    #[error("{0}")]
    Conflict(ConflictReport),
    /// The base solver failed internally. Fatal; never retried.
    #[error("base solver failure: {0}")]
    Solver(String),
    /// The universe could not be translated into the constraint model.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Resolves requests against universes using a [`BaseSolver`].
pub struct Planner<S> {
    solver: S,
    preamble: Preamble,
    dump_dir: Option<PathBuf>,
}

impl<S: BaseSolver> Planner<S> {
    /// Creates a planner around a base solver.
    pub fn new(solver: S) -> Self {
        Planner {
            solver,
            preamble: Preamble::default(),
            dump_dir: None,
        }
    }

    /// Enables debug dumps (`universe.cudf`, `*.dot`) under `dir`.
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    /// Resolves `request` against `universe`, where `installed` names the
    /// currently installed packages. Returns the action plan, a conflict
    /// explanation, or a fatal error.
    pub fn resolve(
        &self,
        universe: &Universe,
        request: &Request,
        installed: &PackageSet,
    ) -> Result<Plan, ResolveError> {
        let install_names: HashSet<&str> = request
            .wish_install
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert!(
            request
                .wish_remove
                .iter()
                .all(|a| !install_names.contains(a.name.as_str())),
            "wish_install and wish_remove must be disjoint"
        );

        tracing::debug!("resolving: {request}");
        let table = Table::new(universe);
        // Removals must propagate through optionally-depending reverse
        // dependents, so they are compiled with depopts treated as hard.
        let depopts_as_hard = !request.wish_remove.is_empty();
        let encoded: Vec<CudfPackage> = universe
            .iter()
            .map(|p| table.to_cudf(p, depopts_as_hard))
            .collect::<Result<_, _>>()?;

        if let Some(dir) = &self.dump_dir {
            if let Ok(plain) = universe
                .iter()
                .map(|p| table.to_cudf(p, false))
                .collect::<Result<Vec<_>, _>>()
            {
                dump::universe(dir, "universe.cudf", &self.preamble, &plain);
            }
            if let Ok(merged) = universe
                .iter()
                .map(|p| table.to_cudf(p, true))
                .collect::<Result<Vec<_>, _>>()
            {
                dump::universe(dir, "universe-all.cudf", &self.preamble, &merged);
            }
        }

        let base_request = self.encode_request(&table, request);
        let (target, actions) = self.solve(&table, universe, &encoded, &base_request)?;

        // Without an install wish there is nothing to optimize for.
        let (target, actions) = if request.wish_install.is_empty() {
            (target, actions)
        } else {
            self.minimize(&table, universe, installed, request, &encoded, target, actions)?
        };

        Ok(plan::build(plan::PlanInputs {
            actions,
            current: universe,
            target: &target,
            installed,
            requested_removals: request
                .wish_remove
                .iter()
                .map(|a| a.name.clone())
                .collect(),
            dump_dir: self.dump_dir.as_deref(),
        }))
    }

    /// The request-level properties every solver call carries, naming the
    /// preamble-declared optional-depends property.
    fn request_extras(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "depopts-property".to_string(),
            DEPOPTS_PROPERTY.to_string(),
        )])
    }

    fn encode_request(&self, table: &Table, request: &Request) -> CudfRequest {
        CudfRequest {
            install: request
                .wish_install
                .iter()
                .map(|a| table.encode_atom(a))
                .collect(),
            remove: request
                .wish_remove
                .iter()
                .map(|a| table.encode_atom(a))
                .collect(),
            upgrade: request
                .wish_upgrade
                .iter()
                .map(|a| table.encode_atom(a))
                .collect(),
            extras: self.request_extras(),
        }
    }

    /// One full solver round: check, decode the target universe, diff it
    /// against the current one.
    fn solve(
        &self,
        table: &Table,
        universe: &Universe,
        encoded: &[CudfPackage],
        request: &CudfRequest,
    ) -> Result<(Universe, Vec<InternalAction>), ResolveError> {
        match self.solver.check_request(&self.preamble, encoded, request) {
            Answer::Sat(packages) => {
                let mut target = Universe::new();
                for cpkg in &packages {
                    target.add(table.from_cudf(universe, cpkg)?);
                }
                let actions = diff::diff(universe, &target);
                Ok((target, actions))
            }
            Answer::Unsat(reasons) => Err(ResolveError::Conflict(ConflictReport::new(
                &reasons, table, universe,
            ))),
            Answer::Error(message) => Err(ResolveError::Solver(message)),
        }
    }

    /// A satisfiability-only probe.
    fn probe_sat(
        &self,
        encoded: &[CudfPackage],
        request: &CudfRequest,
    ) -> Result<bool, ResolveError> {
        match self.solver.check_request(&self.preamble, encoded, request) {
            Answer::Sat(_) => Ok(true),
            Answer::Unsat(_) => Ok(false),
            Answer::Error(message) => Err(ResolveError::Solver(message)),
        }
    }

    /// The second pass: reprobe each moved package toward its newest
    /// version, then re-solve with the probes that succeeded, dropping
    /// upgrade atoms for packages nobody installed or depends on. The less
    /// disruptive of the raw and optimized answers wins.
    #[allow(clippy::too_many_arguments)]
    fn minimize(
        &self,
        table: &Table,
        universe: &Universe,
        installed: &PackageSet,
        request: &Request,
        encoded: &[CudfPackage],
        target: Universe,
        actions: Vec<InternalAction>,
    ) -> Result<(Universe, Vec<InternalAction>), ResolveError> {
        let pinned: HashSet<&str> = request
            .wish_install
            .iter()
            .filter(|a| a.constraint.is_some())
            .map(|a| a.name.as_str())
            .collect();
        let mut keep_versions = Vec::new();
        let mut change_versions = Vec::new();
        for action in &actions {
            if let InternalAction::Change { to, .. } = action {
                if pinned.contains(to.name.as_str()) {
                    keep_versions.push(to.id());
                } else {
                    change_versions.push(to.id());
                }
            }
        }
        if change_versions.is_empty() {
            return Ok((target, actions));
        }

        let pins = |upgrade: &mut Vec<Atom>| {
            for id in &keep_versions {
                upgrade.push(Atom::constrained(
                    id.name.clone(),
                    Relop::Eq,
                    id.version.clone(),
                ));
            }
        };

        // Independently reprobe every moved package at its newest version,
        // holding the others at least where the solver put them.
        let mut max_names: HashSet<String> = HashSet::new();
        for probe in &change_versions {
            let Some(max) = universe.max_version(&probe.name) else {
                continue;
            };
            let mut upgrade = Vec::new();
            pins(&mut upgrade);
            upgrade.push(Atom::constrained(probe.name.clone(), Relop::Eq, max.clone()));
            for other in &change_versions {
                if other.name != probe.name {
                    upgrade.push(Atom::constrained(
                        other.name.clone(),
                        Relop::Geq,
                        other.version.clone(),
                    ));
                }
            }
            let probe_request = CudfRequest {
                upgrade: upgrade.iter().map(|a| table.encode_atom(a)).collect(),
                extras: self.request_extras(),
                ..CudfRequest::default()
            };
            if self.probe_sat(encoded, &probe_request)? {
                tracing::trace!("{} can move to its newest version", probe.name);
                max_names.insert(probe.name.clone());
            }
        }

        // The minimize filter: an upgrade atom is only relevant when its
        // package is installed, or is a transitive dependency of an
        // installed package. Packages being removed do not count as
        // installed here.
        let removed_names: HashSet<&str> = request
            .wish_remove
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        let installed_kept: PackageSet = installed
            .iter()
            .filter(|id| !removed_names.contains(id.name.as_str()))
            .cloned()
            .collect();
        let relevant: HashSet<String> = graph::filter_forward_dependencies(universe, &installed_kept)
            .into_iter()
            .map(|p| p.name)
            .collect();
        if let Some(dir) = &self.dump_dir {
            let mut filter_graph = DepGraph::build(universe.iter(), false);
            filter_graph.transitive_reduction();
            dump::dot(dir, "filter-depends.dot", &filter_graph);
        }

        let mut upgrade = Vec::new();
        pins(&mut upgrade);
        for id in &change_versions {
            if max_names.contains(&id.name) {
                if let Some(max) = universe.max_version(&id.name) {
                    upgrade.push(Atom::constrained(id.name.clone(), Relop::Eq, max.clone()));
                }
            } else {
                upgrade.push(Atom::constrained(
                    id.name.clone(),
                    Relop::Geq,
                    id.version.clone(),
                ));
            }
        }
        upgrade.retain(|atom| relevant.contains(&atom.name));

        let final_request = CudfRequest {
            upgrade: upgrade.iter().map(|a| table.encode_atom(a)).collect(),
            ..self.encode_request(table, request)
        };
        match self.solver.check_request(&self.preamble, encoded, &final_request) {
            Answer::Sat(packages) => {
                let mut probe_universe = Universe::new();
                for cpkg in &packages {
                    probe_universe.add(table.from_cudf(universe, cpkg)?);
                }
                let probe_actions = diff::diff(universe, &probe_universe);
                let churn =
                    |actions: &[InternalAction]| actions.iter().filter(|a| a.is_disruptive()).count();
                if churn(&probe_actions) <= churn(&actions) {
                    Ok((probe_universe, probe_actions))
                } else {
                    tracing::debug!("optimized answer is more disruptive, keeping the raw one");
                    Ok((target, actions))
                }
            }
            // The optimized request can overshoot; the raw answer is still
            // valid, fall back to it.
            Answer::Unsat(_) => Ok((target, actions)),
            Answer::Error(message) => Err(ResolveError::Solver(message)),
        }
    }
}
