//! Minimal PEP 440 version and specifier support (release segments plus
//! a/b/rc pre-releases, which is all interpreter versions ever use).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:(a|b|rc)(\d+))?$").expect("Invalid regex")
});

static SPECIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(===|==|~=|!=|<=|>=|<|>)\s*(.+)$").expect("Invalid regex"));

/// Pre-release phase, ordered the way PEP 440 orders them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreRelease {
    Alpha,
    Beta,
    Rc,
}

/// A parsed version such as `3.12`, `3.13.0` or `3.14.0rc2`.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    raw: String,
    pub release: (u64, u64, u64),
    pub pre: Option<(PreRelease, u64)>,
}

impl Version {
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = VERSION_RE
            .captures(trimmed)
            .ok_or_else(|| format!("invalid version: {trimmed}"))?;
        let major: u64 = caps[1].parse().map_err(|_| format!("invalid version: {trimmed}"))?;
        let minor: u64 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).unwrap_or(0);
        let micro: u64 = caps.get(3).map_or(Ok(0), |m| m.as_str().parse()).unwrap_or(0);
        let pre = match caps.get(4) {
            Some(kind) => {
                let kind = match kind.as_str() {
                    "a" => PreRelease::Alpha,
                    "b" => PreRelease::Beta,
                    _ => PreRelease::Rc,
                };
                let num: u64 = caps[5].parse().map_err(|_| format!("invalid version: {trimmed}"))?;
                Some((kind, num))
            }
            None => None,
        };
        Ok(Version {
            raw: trimmed.to_string(),
            release: (major, minor, micro),
            pre,
        })
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.release == other.release && self.pre == other.pre
    }
}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.release.hash(state);
        self.pre.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.release.cmp(&other.release) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        // a final release sorts after any of its pre-releases
        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(ours), Some(theirs)) => ours.cmp(theirs),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Comparison operator of a single specifier clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Compatible,
    Arbitrary,
}

/// One `op version` clause, e.g. `>=3.11` or `==3.12.*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    raw: String,
    pub op: CompareOp,
    pub version: Version,
    /// `Some(n)` for `.*` wildcards, where `n` is the compared precision.
    pub wildcard: Option<usize>,
}

impl FromStr for Specifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = SPECIFIER_RE
            .captures(trimmed)
            .ok_or_else(|| format!("invalid specifier: {trimmed}"))?;
        let op = match &caps[1] {
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            "~=" => CompareOp::Compatible,
            _ => CompareOp::Arbitrary,
        };
        let mut version_str = caps[2].trim().to_string();
        let wildcard = if version_str.ends_with(".*") {
            version_str.truncate(version_str.len() - 2);
            Some(version_str.split('.').count())
        } else {
            None
        };
        let version = Version::from_str(&version_str)?;
        Ok(Specifier {
            raw: trimmed.to_string(),
            op,
            version,
            wildcard,
        })
    }
}

impl Specifier {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Does *candidate* satisfy this clause?
    pub fn contains(&self, candidate: &Version) -> bool {
        if let Some(precision) = self.wildcard {
            let ours = release_prefix(&self.version.release, precision);
            let theirs = release_prefix(&candidate.release, precision);
            // a wildcard only means something for equality operators; any
            // other combination is a clause nothing satisfies
            return match self.op {
                CompareOp::Eq => theirs == ours,
                CompareOp::Ne => theirs != ours,
                _ => false,
            };
        }
        match self.op {
            CompareOp::Eq => candidate == &self.version,
            CompareOp::Ne => candidate != &self.version,
            CompareOp::Lt => candidate < &self.version,
            CompareOp::Le => candidate <= &self.version,
            CompareOp::Gt => candidate > &self.version,
            CompareOp::Ge => candidate >= &self.version,
            CompareOp::Compatible => self.contains_compatible(candidate),
            CompareOp::Arbitrary => candidate.as_str() == self.version.as_str(),
        }
    }

    // `~= X.Y.Z` means `>= X.Y.Z, < X.(Y+1)`
    fn contains_compatible(&self, candidate: &Version) -> bool {
        if candidate < &self.version {
            return false;
        }
        let (major, minor, _) = self.version.release;
        let upper = Version {
            raw: format!("{major}.{}", minor + 1),
            release: (major, minor + 1, 0),
            pre: None,
        };
        candidate < &upper
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn release_prefix(release: &(u64, u64, u64), precision: usize) -> Vec<u64> {
    [release.0, release.1, release.2][..precision.min(3)].to_vec()
}

/// A comma-separated conjunction of specifier clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecifierSet {
    raw: String,
    specifiers: Vec<Specifier>,
}

impl FromStr for SpecifierSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut specifiers = Vec::new();
        for clause in trimmed.split(',') {
            let clause = clause.trim();
            if !clause.is_empty() {
                specifiers.push(Specifier::from_str(clause)?);
            }
        }
        Ok(SpecifierSet {
            raw: trimmed.to_string(),
            specifiers,
        })
    }
}

impl SpecifierSet {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn iter(&self) -> impl Iterator<Item = &Specifier> {
        self.specifiers.iter()
    }

    /// Does *candidate* satisfy every clause in the set?
    pub fn contains(&self, candidate: &Version) -> bool {
        self.specifiers.iter().all(|spec| spec.contains(candidate))
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
