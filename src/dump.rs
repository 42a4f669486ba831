//! Debug dump files.
//!
//! When a dump directory is configured, the resolver drops the encoded
//! universes and the dependency graphs it works with at stable filenames.
//! These are observability aids, not contracts: a failed write is logged
//! and never affects resolution.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use itertools::Itertools;

use crate::cudf::{CudfAtom, CudfPackage, Preamble};
use crate::graph::DepGraph;

fn clause_text(clause: &[CudfAtom]) -> String {
    clause.iter().map(ToString::to_string).join(" | ")
}

fn write_universe(
    path: &Path,
    preamble: &Preamble,
    packages: &[CudfPackage],
) -> io::Result<()> {
    let mut f = File::create(path)?;
    writeln!(f, "preamble: ")?;
    for (name, ty) in &preamble.properties {
        writeln!(f, "property: {name}: {ty}")?;
    }
    writeln!(f)?;
    for pkg in packages {
        writeln!(f, "package: {}", pkg.name)?;
        writeln!(f, "version: {}", pkg.version)?;
        if !pkg.depends.is_empty() {
            writeln!(
                f,
                "depends: {}",
                pkg.depends.iter().map(|c| clause_text(c)).join(", ")
            )?;
        }
        if !pkg.conflicts.is_empty() {
            writeln!(f, "conflicts: {}", clause_text(&pkg.conflicts))?;
        }
        if pkg.installed {
            writeln!(f, "installed: true")?;
        }
        for (key, value) in &pkg.extras {
            writeln!(f, "{key}: {value}")?;
        }
        writeln!(f)?;
    }
    Ok(())
}

/// Dumps an encoded universe as a `.cudf` document.
pub(crate) fn universe(dir: &Path, file: &str, preamble: &Preamble, packages: &[CudfPackage]) {
    if let Err(err) = write_universe(&dir.join(file), preamble, packages) {
        tracing::warn!("could not dump {file}: {err}");
    }
}

/// Dumps a dependency graph as a `.dot` document.
pub(crate) fn dot(dir: &Path, file: &str, graph: &DepGraph) {
    let result = File::create(dir.join(file)).and_then(|mut f| graph.write_dot(&mut f));
    if let Err(err) = result {
        tracing::warn!("could not dump {file}: {err}");
    }
}
