//! Translation between the external package model and the integer-versioned
//! constraint model.
//!
//! A [`Table`] is built once per resolution from the universe being solved.
//! It owns the name escaping and the dense `(name, version)` ↔ integer
//! mapping, outlives every structure derived from it, and is consulted for
//! every translation between the two forms. Optional-dependency formulas
//! are parsed once and cached here rather than re-parsed on every access.

use std::cell::RefCell;
use std::fmt::Write as _;

use ahash::{HashMap, HashMapExt};
use thiserror::Error;

use crate::cudf::{CudfAtom, CudfPackage, DEPOPTS_PROPERTY};
use crate::formula;
use crate::model::{Atom, Package, PkgId, Relop, Universe};
use crate::version::Version;

/// Errors produced while translating between the two package models.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// An optional-dependency formula in an extras property does not parse.
    #[error("malformed optional dependency formula for {package}: {formula:?} ({message})")]
    MalformedDepopt {
        /// Package carrying the formula.
        package: String,
        /// The offending formula text.
        formula: String,
        /// Parser diagnostics.
        message: String,
    },
    /// A name (or `name=version` identity) that the table does not know.
    #[error("unknown package identifier {0}")]
    UnknownName(String),
    /// An integer version with no preimage in the table.
    #[error("unknown encoded version {version} for package {name}")]
    UnknownVersion {
        /// Package name.
        name: String,
        /// The integer version that could not be translated back.
        version: u32,
    },
}

/// Escapes a package name into the character set the base solver accepts:
/// `[a-z A-Z 0-9 . + -]`, everything else percent-encoded per byte.
pub fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'+' | b'-' => {
                out.push(byte as char);
            }
            _ => {
                let _ = write!(out, "%{byte:02x}");
            }
        }
    }
    out
}

/// Inverse of [`escape_name`].
pub fn unescape_name(escaped: &str) -> Result<String, EncodeError> {
    let unknown = || EncodeError::UnknownName(escaped.to_string());
    let mut bytes = Vec::with_capacity(escaped.len());
    let mut iter = escaped.bytes();
    while let Some(byte) = iter.next() {
        if byte == b'%' {
            let hi = iter.next().ok_or_else(unknown)?;
            let lo = iter.next().ok_or_else(unknown)?;
            let hex = [hi, lo];
            let hex = std::str::from_utf8(&hex).map_err(|_| unknown())?;
            bytes.push(u8::from_str_radix(hex, 16).map_err(|_| unknown())?);
        } else {
            bytes.push(byte);
        }
    }
    String::from_utf8(bytes).map_err(|_| unknown())
}

/// The name/version translation table for one resolution.
pub struct Table {
    to_int: HashMap<PkgId, u32>,
    from_int: HashMap<(String, u32), Version>,
    versions_by_name: HashMap<String, Vec<Version>>,
    depopt_cache: RefCell<HashMap<String, Vec<Vec<Atom>>>>,
}

impl Table {
    /// Scans the universe and assigns every `(name, version)` pair a dense
    /// integer version, starting at 1 per name and monotonic in the version
    /// order.
    pub fn new(universe: &Universe) -> Table {
        let mut to_int = HashMap::new();
        let mut from_int = HashMap::new();
        let mut versions_by_name = HashMap::new();
        for name in universe.names() {
            // `Universe` keeps versions sorted ascending.
            let versions: Vec<Version> = universe
                .packages(name)
                .iter()
                .map(|p| p.version.clone())
                .collect();
            for (index, version) in versions.iter().enumerate() {
                let int = index as u32 + 1;
                to_int.insert(PkgId::new(name, version.clone()), int);
                from_int.insert((name.to_string(), int), version.clone());
            }
            versions_by_name.insert(name.to_string(), versions);
        }
        Table {
            to_int,
            from_int,
            versions_by_name,
            depopt_cache: RefCell::new(HashMap::new()),
        }
    }

    /// The integer version of a known `(name, version)` pair.
    pub fn encode_version(&self, id: &PkgId) -> Option<u32> {
        self.to_int.get(id).copied()
    }

    /// The external version behind an integer version.
    pub fn decode_version(&self, name: &str, version: u32) -> Result<&Version, EncodeError> {
        self.from_int
            .get(&(name.to_string(), version))
            .ok_or_else(|| EncodeError::UnknownVersion {
                name: name.to_string(),
                version,
            })
    }

    /// Translates a constraint on external versions into one on integer
    /// versions. Constraints on versions absent from the table are rounded
    /// to the nearest table version with the same meaning; a constraint no
    /// table version satisfies becomes the canonical unsatisfiable
    /// `(Eq, 0)` (integer versions start at 1). `None` means any version.
    fn encode_constraint(
        &self,
        name: &str,
        relop: Relop,
        version: &Version,
    ) -> Option<(Relop, u32)> {
        if let Some(&int) = self.to_int.get(&PkgId::new(name, version.clone())) {
            return Some((relop, int));
        }
        const UNSAT: (Relop, u32) = (Relop::Eq, 0);
        let versions = self
            .versions_by_name
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        // Number of known versions strictly below the bound; those carry the
        // integer versions 1..=below.
        let below = versions.partition_point(|v| v < version) as u32;
        let count = versions.len() as u32;
        match relop {
            Relop::Eq => Some(UNSAT),
            Relop::Neq => None,
            // The bound itself is not a known version, so < and <= coincide,
            // as do > and >=.
            Relop::Lt | Relop::Leq => {
                if below == 0 {
                    Some(UNSAT)
                } else {
                    Some((Relop::Leq, below))
                }
            }
            Relop::Gt | Relop::Geq => {
                if below >= count {
                    Some(UNSAT)
                } else {
                    Some((Relop::Geq, below + 1))
                }
            }
        }
    }

    /// Encodes an atom. Self-inverse with [`Self::decode_atom`] on atoms
    /// whose constraint version exists in the table.
    pub fn encode_atom(&self, atom: &Atom) -> CudfAtom {
        CudfAtom {
            name: escape_name(&atom.name),
            constraint: atom
                .constraint
                .as_ref()
                .and_then(|(relop, version)| self.encode_constraint(&atom.name, *relop, version)),
        }
    }

    /// Decodes an atom, failing on identifiers the table does not know.
    pub fn decode_atom(&self, atom: &CudfAtom) -> Result<Atom, EncodeError> {
        let name = unescape_name(&atom.name)?;
        let constraint = match atom.constraint {
            None => None,
            Some((relop, version)) => Some((relop, self.decode_version(&name, version)?.clone())),
        };
        Ok(Atom { name, constraint })
    }

    /// Decodes an atom for display purposes: an untranslatable constraint
    /// (a rounding artifact) is dropped instead of failing.
    pub fn decode_atom_lossy(&self, atom: &CudfAtom) -> Atom {
        let name = unescape_name(&atom.name).unwrap_or_else(|_| atom.name.clone());
        let constraint = atom.constraint.and_then(|(relop, version)| {
            self.decode_version(&name, version)
                .ok()
                .map(|v| (relop, v.clone()))
        });
        Atom { name, constraint }
    }

    /// The optional dependencies of a package: its structural `depopts`
    /// list, or, when that is empty, the formula stored in the
    /// [`DEPOPTS_PROPERTY`] extras property (parsed once and cached).
    pub fn depopts_of(&self, pkg: &Package) -> Result<Vec<Vec<Atom>>, EncodeError> {
        if !pkg.depopts.is_empty() {
            return Ok(pkg.depopts.clone());
        }
        let Some(text) = pkg.extras.get(DEPOPTS_PROPERTY) else {
            return Ok(Vec::new());
        };
        if let Some(cached) = self.depopt_cache.borrow().get(text) {
            return Ok(cached.clone());
        }
        let parsed =
            formula::parse_formula(text).map_err(|message| EncodeError::MalformedDepopt {
                package: pkg.id().to_string(),
                formula: text.clone(),
                message,
            })?;
        self.depopt_cache
            .borrow_mut()
            .insert(text.clone(), parsed.clone());
        Ok(parsed)
    }

    /// Translates a package into the constraint model. When
    /// `depopts_as_hard` is set the optional dependencies are merged into
    /// the hard dependency formula, so that removals propagate through
    /// optionally-depending reverse dependents.
    pub fn to_cudf(&self, pkg: &Package, depopts_as_hard: bool) -> Result<CudfPackage, EncodeError> {
        let id = pkg.id();
        let version = self
            .encode_version(&id)
            .ok_or_else(|| EncodeError::UnknownName(id.to_string()))?;
        let mut depends: Vec<Vec<CudfAtom>> = pkg
            .depends
            .iter()
            .map(|clause| clause.iter().map(|atom| self.encode_atom(atom)).collect())
            .collect();
        let depopts = self.depopts_of(pkg)?;
        if depopts_as_hard {
            depends.extend(
                depopts
                    .iter()
                    .map(|clause| clause.iter().map(|atom| self.encode_atom(atom)).collect()),
            );
        }
        let mut extras = pkg.extras.clone();
        if !depopts.is_empty() {
            extras.insert(DEPOPTS_PROPERTY.to_string(), formula::print_formula(&depopts));
        }
        Ok(CudfPackage {
            name: escape_name(&pkg.name),
            version,
            installed: pkg.installed,
            depends,
            conflicts: pkg
                .conflicts
                .iter()
                .map(|atom| self.encode_atom(atom))
                .collect(),
            extras,
        })
    }

    /// Inverse translation: resolves the encoded identity back to the
    /// original package in `universe` and applies the answer's `installed`
    /// flag. Metadata never round-trips through the integer model, so it
    /// cannot be damaged by it. An identity the table does not know means
    /// the solver violated its contract.
    pub fn from_cudf(
        &self,
        universe: &Universe,
        cpkg: &CudfPackage,
    ) -> Result<Package, EncodeError> {
        let name = unescape_name(&cpkg.name)?;
        let version = self.decode_version(&name, cpkg.version)?.clone();
        let id = PkgId { name, version };
        let mut pkg = universe
            .lookup(&id)
            .ok_or_else(|| EncodeError::UnknownName(id.to_string()))?
            .clone();
        pkg.installed = cpkg.installed;
        Ok(pkg)
    }
}
