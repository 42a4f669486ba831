//! Opaque package versions with a total order.
//!
//! The rest of the crate never inspects a version beyond comparing it; the
//! encoder relies solely on the order being total to assign dense integer
//! versions. The comparison implemented here is the chunked ordering used by
//! source-based package managers: alternating non-digit and digit chunks,
//! digit chunks compared numerically, and `~` sorting before everything
//! including the end of the string (so `1.0~beta < 1.0 < 1.0.1`).

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

/// A package version. Totally ordered, otherwise opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    /// Creates a version from its textual form.
    pub fn new(s: impl Into<String>) -> Self {
        Version(s.into())
    }

    /// The textual form of the version.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Version(s)
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Distinct spellings that compare equal ("1.0" vs "1.00") are broken
        // by the raw string so that Ord stays consistent with Eq.
        compare(self.0.as_bytes(), other.0.as_bytes()).then_with(|| self.0.cmp(&other.0))
    }
}

/// Weight of a byte inside a non-digit chunk. `~` sorts before the end of
/// the string, letters before the remaining punctuation.
fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(c) => c as i32 + 256,
    }
}

fn compare(mut a: &[u8], mut b: &[u8]) -> Ordering {
    while !a.is_empty() || !b.is_empty() {
        // Non-digit chunk.
        while a.first().is_some_and(|c| !c.is_ascii_digit())
            || b.first().is_some_and(|c| !c.is_ascii_digit())
        {
            let oa = order(a.first().copied());
            let ob = order(b.first().copied());
            if oa != ob {
                return oa.cmp(&ob);
            }
            a = &a[usize::from(!a.is_empty())..];
            b = &b[usize::from(!b.is_empty())..];
        }

        // Digit chunk, compared numerically: skip leading zeroes, then the
        // first differing digit decides unless one number is longer.
        while a.first() == Some(&b'0') {
            a = &a[1..];
        }
        while b.first() == Some(&b'0') {
            b = &b[1..];
        }
        let mut first_diff = Ordering::Equal;
        while a.first().is_some_and(u8::is_ascii_digit) && b.first().is_some_and(u8::is_ascii_digit)
        {
            if first_diff == Ordering::Equal {
                first_diff = a[0].cmp(&b[0]);
            }
            a = &a[1..];
            b = &b[1..];
        }
        if a.first().is_some_and(u8::is_ascii_digit) {
            return Ordering::Greater;
        }
        if b.first().is_some_and(u8::is_ascii_digit) {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }
    Ordering::Equal
}
