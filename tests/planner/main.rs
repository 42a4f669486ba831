mod toy_solver;

use ordino::cudf::{Answer, BaseSolver, CudfPackage, CudfRequest, DEPOPTS_PROPERTY, Preamble};
use ordino::{
    Action, Atom, Package, Plan, Planner, Relop, Request, ResolveError, Universe, parse_formula,
};
use toy_solver::ToySolver;
use tracing_test::traced_test;

fn installed(name: &str, version: &str) -> Package {
    let mut pkg = Package::new(name, version);
    pkg.installed = true;
    pkg
}

/// Each string is one dependency clause, e.g. `"a >= 1 | b"`.
fn deps(clauses: &[&str]) -> Vec<Vec<Atom>> {
    clauses
        .iter()
        .map(|clause| parse_formula(clause).unwrap().remove(0))
        .collect()
}

fn resolve(universe: &Universe, request: Request) -> Result<Plan, ResolveError> {
    Planner::new(ToySolver).resolve(universe, &request, &universe.installed_set())
}

fn action_lines(plan: &Plan) -> Vec<String> {
    plan.to_add.topo_order().iter().map(ToString::to_string).collect()
}

/// Installing a leaf package yields a single install vertex.
#[test]
fn fresh_install_of_a_leaf() {
    let universe = Universe::from_packages([Package::new("a", "1")]);
    let plan = resolve(&universe, Request::install(vec![Atom::any("a")])).unwrap();

    assert!(plan.to_remove.is_empty());
    assert_eq!(action_lines(&plan), ["install a=1"]);
    assert_eq!(plan.to_add.edges().count(), 0);
    assert!(!plan.delete_or_update());
    assert_eq!(plan.stats().to_string(), "1 to install");
}

/// The dependency is installed first.
#[test]
fn install_with_dependency() {
    let universe = Universe::from_packages([
        Package::new("a", "1").with_depends(deps(&["b"])),
        Package::new("b", "1"),
    ]);
    let plan = resolve(&universe, Request::install(vec![Atom::any("a")])).unwrap();

    assert_eq!(action_lines(&plan), ["install b=1", "install a=1"]);
    assert!(plan.to_add.has_edge("b", "a"));
}

/// Upgrading a dependency recompiles its dependents, after it.
#[test]
#[traced_test]
fn upgrade_propagates_recompile() {
    let universe = Universe::from_packages([
        installed("a", "1"),
        Package::new("a", "2"),
        installed("b", "1").with_depends(deps(&["a"])),
    ]);
    let plan = resolve(&universe, Request::upgrade(vec![Atom::any("a")])).unwrap();

    assert!(plan.to_remove.is_empty());
    assert_eq!(action_lines(&plan), ["upgrade a=1 to 2", "recompile b=1"]);
    assert!(plan.to_add.has_edge("a", "b"));
    assert!(plan.delete_or_update());
}

/// Removal propagates through an optional dependency; the dependent is
/// rebuilt, never silently left with a dangling edge.
#[test]
fn remove_propagates_through_optional_dependency() {
    let universe = Universe::from_packages([
        installed("a", "1"),
        installed("b", "1").with_depopts(deps(&["a"])),
    ]);
    let plan = resolve(&universe, Request::remove(vec![Atom::any("a")])).unwrap();

    let removed: Vec<String> = plan.to_remove.iter().map(|p| p.id().to_string()).collect();
    assert_eq!(removed, ["a=1"]);
    assert!(matches!(plan.to_add.get("b"), Some(Action::Recompile { .. })));
    assert_eq!(plan.stats().to_string(), "1 to recompile, 1 to remove");
}

/// A hard dependent of a removed package is removed too, dependency first.
#[test]
fn remove_cascades_through_hard_dependency() {
    let universe = Universe::from_packages([
        installed("a", "1"),
        installed("b", "1").with_depends(deps(&["a"])),
        installed("c", "1").with_depends(deps(&["b"])),
    ]);
    let plan = resolve(&universe, Request::remove(vec![Atom::any("a")])).unwrap();

    let removed: Vec<String> = plan.to_remove.iter().map(|p| p.id().to_string()).collect();
    assert_eq!(removed, ["a=1", "b=1", "c=1"]);
    assert!(plan.to_add.is_empty());
}

/// An unsatisfiable install is explained with the missing constraint
/// and a dependency chain starting at a real package.
#[test]
fn conflict_report_shows_missing_and_chain() {
    let universe = Universe::from_packages([
        Package::new("a", "1").with_depends(deps(&["b >= 2"])),
        Package::new("b", "1"),
    ]);
    let err = resolve(&universe, Request::install(vec![Atom::any("a")])).unwrap_err();
    let ResolveError::Conflict(report) = err else {
        panic!("expected a conflict, got {err:?}");
    };

    // Chains never start at the synthetic request vertex, and every link
    // comes from a Dependency fact.
    assert_eq!(
        report.chains(),
        vec![vec!["a=1".to_string(), "b=1".to_string()]]
    );
    insta::assert_snapshot!(report.to_string(), @r###"
    The request cannot be satisfied:
      - a=1 is missing a candidate for b >= 2
    The following dependency chains explain the failure:
      - a=1 <- b=1
    "###);
}

/// Conflicting packages are reported as such.
#[test]
fn conflict_report_shows_conflicts() {
    let universe = Universe::from_packages([
        Package::new("a", "1").with_conflicts(vec![Atom::any("b")]),
        Package::new("b", "1"),
    ]);
    let err = resolve(
        &universe,
        Request::install(vec![Atom::any("a"), Atom::any("b")]),
    )
    .unwrap_err();
    let ResolveError::Conflict(report) = err else {
        panic!("expected a conflict, got {err:?}");
    };
    assert!(
        report
            .to_string()
            .contains("a=1 is in conflict with b=1")
    );
}

/// Installing a package whose dependency is already satisfied touches
/// nothing, even though a newer version of the dependency exists.
#[test]
fn minimization_avoids_gratuitous_upgrade() {
    let universe = Universe::from_packages([
        installed("a", "1"),
        Package::new("a", "2"),
        installed("b", "1").with_depends(deps(&["a >= 1"])),
    ]);
    let plan = resolve(&universe, Request::install(vec![Atom::any("b")])).unwrap();

    assert!(plan.is_empty(), "expected no actions, got:\n{plan}");
}

/// An unconstrained install picks the newest version.
#[test]
fn fresh_install_prefers_the_newest_version() {
    let universe = Universe::from_packages([
        Package::new("x", "1"),
        Package::new("x", "2"),
    ]);
    let plan = resolve(&universe, Request::install(vec![Atom::any("x")])).unwrap();
    assert_eq!(action_lines(&plan), ["install x=2"]);
}

/// A constrained install pins the version even when newer ones exist.
#[test]
fn pinned_install_keeps_the_requested_version() {
    let universe = Universe::from_packages([
        Package::new("x", "1"),
        Package::new("x", "2"),
    ]);
    let plan = resolve(
        &universe,
        Request::install(vec![Atom::constrained("x", Relop::Eq, "1")]),
    )
    .unwrap();
    assert_eq!(action_lines(&plan), ["install x=1"]);
}

/// Coverage: exactly one action per name whose state differs, and the
/// action graph is acyclic.
#[test]
fn plans_cover_each_changed_name_once() {
    let universe = Universe::from_packages([
        installed("a", "1"),
        Package::new("a", "2"),
        installed("b", "1").with_depends(deps(&["a"])),
        Package::new("c", "1").with_depends(deps(&["a"])),
    ]);
    let request = Request {
        wish_install: vec![Atom::any("c")],
        wish_remove: vec![],
        wish_upgrade: vec![Atom::any("a")],
    };
    let plan = resolve(&universe, request).unwrap();

    let mut names: Vec<&str> = plan.to_add.actions().map(Action::name).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), plan.to_add.len(), "duplicate action for a name");
    // topo_order visits every vertex exactly once on a DAG
    assert_eq!(plan.to_add.topo_order().len(), plan.to_add.len());
    assert_eq!(plan.stats().upgrade, 1);
    assert_eq!(plan.stats().install, 1);
    assert_eq!(plan.stats().reinstall, 1);
}

/// Minimization stability: applying a plan and resolving the same request
/// again plans nothing.
#[test]
fn resolution_is_idempotent() {
    let universe = Universe::from_packages([
        installed("a", "1"),
        Package::new("a", "2"),
        installed("b", "1").with_depends(deps(&["a"])),
    ]);
    let request = Request::upgrade(vec![Atom::any("a")]);
    let plan = resolve(&universe, request.clone()).unwrap();
    assert!(!plan.is_empty());

    // The post-state universe: a moved to 2, b untouched.
    let post = Universe::from_packages([
        Package::new("a", "1"),
        installed("a", "2"),
        installed("b", "1").with_depends(deps(&["a"])),
    ]);
    let replay = resolve(&post, request).unwrap();
    assert!(replay.is_empty(), "expected a fixpoint, got:\n{replay}");
}

/// Soundness of the removal side: after a remove request, nothing in the
/// plan's target state still hard-depends on a removed package.
#[test]
fn removal_leaves_no_dangling_hard_dependency() {
    let universe = Universe::from_packages([
        installed("a", "1"),
        installed("b", "1").with_depends(deps(&["a"])),
        installed("c", "1").with_depopts(deps(&["b"])),
    ]);
    let plan = resolve(&universe, Request::remove(vec![Atom::any("a")])).unwrap();

    let removed: Vec<String> = plan.to_remove.iter().map(|p| p.id().to_string()).collect();
    assert_eq!(removed, ["a=1", "b=1"]);
    // c only optionally depended on b and survives as a recompile.
    assert!(matches!(plan.to_add.get("c"), Some(Action::Recompile { .. })));
}

/// A malformed optional-dependency formula is a fatal encoder error.
#[test]
fn malformed_depopt_formula_is_fatal() {
    let universe =
        Universe::from_packages([Package::new("a", "1").with_extra(DEPOPTS_PROPERTY, "b >=")]);
    let err = resolve(&universe, Request::install(vec![Atom::any("a")])).unwrap_err();
    assert!(matches!(err, ResolveError::Encode(_)), "got {err:?}");
}

/// Base-solver failures surface as opaque fatal errors.
#[test]
fn solver_errors_are_fatal() {
    struct BrokenSolver;
    impl BaseSolver for BrokenSolver {
        fn check_request(
            &self,
            _preamble: &Preamble,
            _universe: &[CudfPackage],
            _request: &CudfRequest,
        ) -> Answer {
            Answer::Error("segfault in the oracle".to_string())
        }
    }

    let universe = Universe::from_packages([Package::new("a", "1")]);
    let err = Planner::new(BrokenSolver)
        .resolve(
            &universe,
            &Request::install(vec![Atom::any("a")]),
            &universe.installed_set(),
        )
        .unwrap_err();
    assert!(matches!(err, ResolveError::Solver(_)));
    assert_eq!(
        err.to_string(),
        "base solver failure: segfault in the oracle"
    );
}

/// An empty request plans nothing.
#[test]
fn empty_request_plans_nothing() {
    let universe = Universe::from_packages([installed("a", "1"), Package::new("a", "2")]);
    let plan = resolve(&universe, Request::default()).unwrap();
    assert!(plan.is_empty());
}

/// The plan listing is stable and human-readable.
#[test]
fn plan_listing_is_ordered() {
    let universe = Universe::from_packages([
        Package::new("a", "1").with_depends(deps(&["b"])),
        Package::new("b", "1").with_depends(deps(&["c"])),
        Package::new("c", "1"),
    ]);
    let plan = resolve(&universe, Request::install(vec![Atom::any("a")])).unwrap();
    assert_eq!(
        plan.to_string(),
        "  - install c=1\n  - install b=1\n  - install a=1\n"
    );
}
