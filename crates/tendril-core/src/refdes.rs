use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

/// Reference designator with natural ordering (C1 < C2 < C10).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Refdes(String);

/// Designators of a BOM line, kept in natural order.
pub type RefdesSet = BTreeSet<Refdes>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefdesError {
    #[error("Empty reference designator")]
    Empty,
    #[error("Reference designator '{0}' contains whitespace")]
    Whitespace(String),
}

impl Refdes {
    pub fn new(s: impl Into<String>) -> Result<Self, RefdesError> {
        let s: String = s.into();
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RefdesError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(RefdesError::Whitespace(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading alphabetic part, e.g. "R" for "R12".
    pub fn prefix(&self) -> &str {
        let end = self
            .0
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

/// Comma separated designators in natural order.
pub fn fmt_refdes(set: &RefdesSet) -> String {
    set.iter().map(Refdes::as_str).collect::<Vec<_>>().join(",")
}

impl TryFrom<String> for Refdes {
    type Error = RefdesError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Refdes::new(s)
    }
}

impl FromStr for Refdes {
    type Err = RefdesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Refdes::new(s)
    }
}

impl From<Refdes> for String {
    fn from(r: Refdes) -> Self {
        r.0
    }
}

impl AsRef<str> for Refdes {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Refdes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialOrd for Refdes {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Refdes {
    fn cmp(&self, other: &Self) -> Ordering {
        natord::compare(&self.0, &other.0)
    }
}
