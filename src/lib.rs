//! Dependency resolution and action planning for a source-based package
//! manager.
//!
//! Given a universe of available package versions (each with
//! version-constrained dependencies, conflicts and optional dependencies)
//! and a request relative to the currently installed set, [`Planner::resolve`]
//! produces either a [`Plan`], a partially-ordered DAG of primitive
//! actions (install, upgrade, downgrade, recompile, delete), or a
//! [`ConflictReport`] explaining why no plan exists.
//!
//! The SAT search itself is delegated to an external solver behind the
//! narrow [`cudf::BaseSolver`] trait. The pipeline around it:
//!
//! ```text
//! Request + Universe
//!     → encoder (integer versions, escaped names, depopt policy)
//!     → base solver → target universe        (conflicts → explainer)
//!     → diff engine → raw actions
//!     → minimizing resolver (probe loop)
//!     → action-graph builder → Plan
//! ```
//!
//! The core is single-threaded and purely functional at the boundary: it
//! performs no I/O beyond optional debug dumps and holds no state between
//! calls.

pub mod cudf;
mod diff;
mod dump;
mod encoder;
mod explain;
mod formula;
pub mod graph;
mod model;
mod plan;
mod resolver;
mod version;

pub use diff::InternalAction;
pub use encoder::{EncodeError, Table, escape_name, unescape_name};
pub use explain::ConflictReport;
pub use formula::{parse_atom, parse_formula, print_formula};
pub use graph::{DepGraph, DepKind, filter_backward_dependencies, filter_forward_dependencies};
pub use model::{Atom, Package, PackageSet, PkgId, Relop, Request, Universe};
pub use plan::{Action, ActionGraph, Plan, Stats};
pub use resolver::{Planner, ResolveError};
pub use version::Version;
