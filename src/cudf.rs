//! The integer-versioned constraint model handed to the base solver, and the
//! narrow contract the solver must satisfy.
//!
//! The core does not implement a SAT search itself. It translates the
//! external package model into the flat, integer-versioned form below, calls
//! [`BaseSolver::check_request`], and interprets the answer. The adapter
//! never retries and never interprets reasons; a solver-internal failure is
//! fatal to the resolution.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use crate::model::Relop;

/// The extras property carrying the optional-dependency formula.
pub const DEPOPTS_PROPERTY: &str = "recommends";

/// Name prefixes of the synthetic package the base solver injects to
/// represent the user request at the root of reason chains. Solver versions
/// differ on the exact spelling, so both known sentinels live here.
const SYNTHETIC_PREFIXES: &[&str] = &["dose-dummy-request", "dummy"];

/// Whether `name` is the synthetic request vertex.
pub fn is_synthetic(name: &str) -> bool {
    SYNTHETIC_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// An encoded atom: an escaped name with an optional constraint on the dense
/// integer version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CudfAtom {
    /// Escaped package name.
    pub name: String,
    /// `None` means any version.
    pub constraint: Option<(Relop, u32)>,
}

impl Display for CudfAtom {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.constraint {
            None => write!(f, "{}", self.name),
            Some((relop, version)) => write!(f, "{} {} {}", self.name, relop, version),
        }
    }
}

/// An encoded package. Versions are dense positive integers, one per
/// distinct external version of the name, monotonic in the external order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CudfPackage {
    /// Escaped package name.
    pub name: String,
    /// Dense integer version, starting at 1.
    pub version: u32,
    /// Whether the package is (or, in an answer, should end up) installed.
    pub installed: bool,
    /// Dependencies in CNF, translated clause-wise.
    pub depends: Vec<Vec<CudfAtom>>,
    /// Co-installation conflicts.
    pub conflicts: Vec<CudfAtom>,
    /// Free-form properties; the optional-dependency formula travels in
    /// [`DEPOPTS_PROPERTY`].
    pub extras: BTreeMap<String, String>,
}

impl Display for CudfPackage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.version)
    }
}

/// An encoded request.
#[derive(Debug, Clone, Default)]
pub struct CudfRequest {
    /// Atoms to install.
    pub install: Vec<CudfAtom>,
    /// Atoms to remove.
    pub remove: Vec<CudfAtom>,
    /// Atoms to upgrade.
    pub upgrade: Vec<CudfAtom>,
    /// Request-level properties.
    pub extras: BTreeMap<String, String>,
}

/// The preamble declaring the custom properties used by the encoding.
#[derive(Debug, Clone)]
pub struct Preamble {
    /// `(name, type)` pairs of declared properties.
    pub properties: Vec<(String, String)>,
}

impl Default for Preamble {
    fn default() -> Self {
        Preamble {
            properties: vec![(
                DEPOPTS_PROPERTY.to_string(),
                "vpkgformula = [true!]".to_string(),
            )],
        }
    }
}

/// One atomic fact in an unsatisfiability report.
#[derive(Debug, Clone)]
pub enum Reason {
    /// Two packages cannot be co-installed; the optional atom is the
    /// conflict clause that forbids the pair.
    Conflict(CudfPackage, CudfPackage, Option<CudfAtom>),
    /// A package has a dependency clause with no satisfying candidate.
    Missing(CudfPackage, Vec<CudfAtom>),
    /// A package depends, through the given clause, on the listed
    /// name-matching candidates. These facts form a DAG whose single root is
    /// the synthetic request vertex.
    Dependency(CudfPackage, Vec<CudfAtom>, Vec<CudfPackage>),
}

/// The outcome of one base-solver call.
#[derive(Debug, Clone)]
pub enum Answer {
    /// A universe satisfying all constraints, with `installed` set on
    /// exactly the packages that should be installed afterwards.
    Sat(Vec<CudfPackage>),
    /// The request cannot be satisfied; the reasons explain why.
    Unsat(Vec<Reason>),
    /// Solver-internal failure, fatal to the resolution.
    Error(String),
}

/// The contract an external dependency solver must satisfy.
///
/// Implementations receive read-only inputs and must be deterministic for a
/// given `(universe, request)` pair; the minimizing resolver issues several
/// independent probes against the same universe and relies on that.
pub trait BaseSolver {
    /// Checks `request` against `universe`.
    fn check_request(
        &self,
        preamble: &Preamble,
        universe: &[CudfPackage],
        request: &CudfRequest,
    ) -> Answer;
}
