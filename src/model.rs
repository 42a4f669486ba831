//! The external package model: packages, version constraints, universes and
//! user requests.
//!
//! Everything here is plain data. A [`Universe`] is the set of all packages
//! known to one resolution; the resolver treats it as immutable and relates
//! packages across universes only by [`PkgId`] (never by reference
//! identity).

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};

use indexmap::IndexMap;

use crate::version::Version;

/// A binary version-comparison operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Relop {
    /// `=`
    Eq,
    /// `!=`
    Neq,
    /// `<`
    Lt,
    /// `<=`
    Leq,
    /// `>`
    Gt,
    /// `>=`
    Geq,
}

impl Relop {
    /// Whether a candidate-vs-bound comparison outcome satisfies the
    /// operator.
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Relop::Eq => ordering == Ordering::Equal,
            Relop::Neq => ordering != Ordering::Equal,
            Relop::Lt => ordering == Ordering::Less,
            Relop::Leq => ordering != Ordering::Greater,
            Relop::Gt => ordering == Ordering::Greater,
            Relop::Geq => ordering != Ordering::Less,
        }
    }
}

impl Display for Relop {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Relop::Eq => "=",
            Relop::Neq => "!=",
            Relop::Lt => "<",
            Relop::Leq => "<=",
            Relop::Gt => ">",
            Relop::Geq => ">=",
        };
        write!(f, "{s}")
    }
}

/// A package name with an optional version constraint.
///
/// A constraint-less atom matches every version of the named package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    /// The package name the atom applies to.
    pub name: String,
    /// `None` means any version.
    pub constraint: Option<(Relop, Version)>,
}

impl Atom {
    /// An atom matching any version of `name`.
    pub fn any(name: impl Into<String>) -> Self {
        Atom {
            name: name.into(),
            constraint: None,
        }
    }

    /// An atom with a version constraint.
    pub fn constrained(name: impl Into<String>, relop: Relop, version: impl Into<Version>) -> Self {
        Atom {
            name: name.into(),
            constraint: Some((relop, version.into())),
        }
    }

    /// Whether `version` satisfies the constraint (the name is not checked).
    pub fn matches_version(&self, version: &Version) -> bool {
        match &self.constraint {
            None => true,
            Some((relop, bound)) => relop.accepts(version.cmp(bound)),
        }
    }

    /// Whether the atom is satisfied by `pkg`.
    pub fn matches(&self, pkg: &Package) -> bool {
        self.name == pkg.name && self.matches_version(&pkg.version)
    }
}

impl Display for Atom {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            None => write!(f, "{}", self.name),
            Some((relop, version)) => write!(f, "{} {} {}", self.name, relop, version),
        }
    }
}

/// The `(name, version)` identity of a package. This is the only way
/// packages are related across universes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PkgId {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: Version,
}

impl PkgId {
    /// Builds an id from parts.
    pub fn new(name: impl Into<String>, version: impl Into<Version>) -> Self {
        PkgId {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl Display for PkgId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.version)
    }
}

/// An ordered set of package identities.
pub type PackageSet = BTreeSet<PkgId>;

/// A single package version with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: Version,
    /// Whether this exact version is currently installed.
    pub installed: bool,
    /// Dependencies in conjunctive normal form: every inner list is a
    /// disjunction of atoms, and every clause must be satisfied.
    pub depends: Vec<Vec<Atom>>,
    /// Packages this one cannot be co-installed with.
    pub conflicts: Vec<Atom>,
    /// Optional dependencies, same shape as `depends`. Satisfied when
    /// possible, ignored when not, but their removal propagates.
    pub depopts: Vec<Vec<Atom>>,
    /// Free-form properties preserved through the encoder round-trip.
    pub extras: BTreeMap<String, String>,
}

impl Package {
    /// A fresh, not-installed package with no dependencies.
    pub fn new(name: impl Into<String>, version: impl Into<Version>) -> Self {
        Package {
            name: name.into(),
            version: version.into(),
            installed: false,
            depends: Vec::new(),
            conflicts: Vec::new(),
            depopts: Vec::new(),
            extras: BTreeMap::new(),
        }
    }

    /// Replaces the dependency formula.
    pub fn with_depends(mut self, depends: Vec<Vec<Atom>>) -> Self {
        self.depends = depends;
        self
    }

    /// Replaces the optional-dependency formula.
    pub fn with_depopts(mut self, depopts: Vec<Vec<Atom>>) -> Self {
        self.depopts = depopts;
        self
    }

    /// Replaces the conflict list.
    pub fn with_conflicts(mut self, conflicts: Vec<Atom>) -> Self {
        self.conflicts = conflicts;
        self
    }

    /// Adds an extras property.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// The `(name, version)` identity of this package.
    pub fn id(&self) -> PkgId {
        PkgId {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

/// The set of all packages known to one resolution, indexed by name.
///
/// Versions of a name are kept sorted ascending. Invariant: at most one
/// version per name carries `installed = true`; violating it on insertion is
/// a caller bug and panics.
#[derive(Debug, Clone, Default)]
pub struct Universe {
    by_name: IndexMap<String, Vec<Package>>,
}

impl Universe {
    /// An empty universe.
    pub fn new() -> Self {
        Universe::default()
    }

    /// Builds a universe from an iterator of packages.
    pub fn from_packages(packages: impl IntoIterator<Item = Package>) -> Self {
        let mut universe = Universe::new();
        for pkg in packages {
            universe.add(pkg);
        }
        universe
    }

    /// Inserts a package, replacing any existing entry with the same
    /// `(name, version)`.
    pub fn add(&mut self, pkg: Package) {
        let versions = self.by_name.entry(pkg.name.clone()).or_default();
        if pkg.installed {
            assert!(
                !versions
                    .iter()
                    .any(|p| p.installed && p.version != pkg.version),
                "universe already has an installed version of {}",
                pkg.name
            );
        }
        match versions.binary_search_by(|p| p.version.cmp(&pkg.version)) {
            Ok(i) => versions[i] = pkg,
            Err(i) => versions.insert(i, pkg),
        }
    }

    /// All versions of `name`, sorted ascending. Empty when unknown.
    pub fn packages(&self, name: &str) -> &[Package] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Looks a package up by identity.
    pub fn lookup(&self, id: &PkgId) -> Option<&Package> {
        self.packages(&id.name)
            .iter()
            .find(|p| p.version == id.version)
    }

    /// The installed version of `name`, if any.
    pub fn installed(&self, name: &str) -> Option<&Package> {
        self.packages(name).iter().find(|p| p.installed)
    }

    /// The highest known version of `name`.
    pub fn max_version(&self, name: &str) -> Option<&Version> {
        self.packages(name).last().map(|p| &p.version)
    }

    /// Iterates over every package of every name.
    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.by_name.values().flatten()
    }

    /// Iterates over all package names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    /// Iterates over the installed packages.
    pub fn installed_packages(&self) -> impl Iterator<Item = &Package> {
        self.iter().filter(|p| p.installed)
    }

    /// The identities of the installed packages.
    pub fn installed_set(&self) -> PackageSet {
        self.installed_packages().map(Package::id).collect()
    }

    /// Packages satisfying `atom`.
    pub fn matching<'a>(&'a self, atom: &'a Atom) -> impl Iterator<Item = &'a Package> {
        self.packages(&atom.name)
            .iter()
            .filter(move |p| atom.matches_version(&p.version))
    }

    /// Total number of packages.
    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    /// Whether the universe holds no packages.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// What the user asked for: packages to install, remove and upgrade.
///
/// A constraint-less install atom means "whatever version fits the rest of
/// the system"; a constrained atom pins the choice. The `wish_install` and
/// `wish_remove` name sets must be disjoint.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Packages to install.
    pub wish_install: Vec<Atom>,
    /// Packages to remove.
    pub wish_remove: Vec<Atom>,
    /// Packages to upgrade.
    pub wish_upgrade: Vec<Atom>,
}

impl Request {
    /// A pure install request.
    pub fn install(atoms: Vec<Atom>) -> Self {
        Request {
            wish_install: atoms,
            ..Request::default()
        }
    }

    /// A pure removal request.
    pub fn remove(atoms: Vec<Atom>) -> Self {
        Request {
            wish_remove: atoms,
            ..Request::default()
        }
    }

    /// A pure upgrade request.
    pub fn upgrade(atoms: Vec<Atom>) -> Self {
        Request {
            wish_upgrade: atoms,
            ..Request::default()
        }
    }

    /// Whether the request asks for nothing.
    pub fn is_empty(&self) -> bool {
        self.wish_install.is_empty() && self.wish_remove.is_empty() && self.wish_upgrade.is_empty()
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut sections = Vec::new();
        for (verb, atoms) in [
            ("install", &self.wish_install),
            ("remove", &self.wish_remove),
            ("upgrade", &self.wish_upgrade),
        ] {
            if !atoms.is_empty() {
                let list = atoms
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                sections.push(format!("{verb} {list}"));
            }
        }
        if sections.is_empty() {
            write!(f, "nothing")
        } else {
            write!(f, "{}", sections.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_matching() {
        let pkg = Package::new("a", "1.2");
        assert!(Atom::any("a").matches(&pkg));
        assert!(Atom::constrained("a", Relop::Geq, "1.0").matches(&pkg));
        assert!(!Atom::constrained("a", Relop::Lt, "1.2").matches(&pkg));
        assert!(!Atom::any("b").matches(&pkg));
    }

    #[test]
    fn universe_keeps_versions_sorted() {
        let universe = Universe::from_packages([
            Package::new("a", "2"),
            Package::new("a", "10"),
            Package::new("a", "1"),
        ]);
        let versions: Vec<_> = universe
            .packages("a")
            .iter()
            .map(|p| p.version.as_str())
            .collect();
        assert_eq!(versions, ["1", "2", "10"]);
        assert_eq!(universe.max_version("a").unwrap().as_str(), "10");
    }

    #[test]
    fn universe_replaces_same_version() {
        let mut universe = Universe::new();
        universe.add(Package::new("a", "1"));
        let mut replacement = Package::new("a", "1");
        replacement.installed = true;
        universe.add(replacement);
        assert_eq!(universe.len(), 1);
        assert!(universe.installed("a").is_some());
    }

    #[test]
    #[should_panic(expected = "already has an installed version")]
    fn universe_rejects_two_installed_versions() {
        let mut universe = Universe::new();
        let mut one = Package::new("a", "1");
        one.installed = true;
        let mut two = Package::new("a", "2");
        two.installed = true;
        universe.add(one);
        universe.add(two);
    }

    #[test]
    fn request_display() {
        let request = Request {
            wish_install: vec![Atom::any("a")],
            wish_remove: vec![Atom::constrained("b", Relop::Eq, "1")],
            wish_upgrade: vec![],
        };
        assert_eq!(request.to_string(), "install a; remove b = 1");
    }
}
