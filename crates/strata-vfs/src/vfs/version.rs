//! Resource versions.
//!
//! Versions are positive integers. [`ResourceVersion::Latest`] is a sentinel
//! that orders above every finite version; filesystem-sourced resources carry
//! it so that package overlays can never displace them.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use super::error::{VfsError, VfsResult};

/// Manifest spelling of the [`ResourceVersion::Latest`] sentinel.
pub const LATEST_TAG: &str = "latest";

/// Version of a single resource attached to a file node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceVersion {
    /// A concrete version, always >= 1.
    Finite(u64),
    /// Always the newest.
    Latest,
}

impl ResourceVersion {
    /// The "always newest" sentinel.
    pub const LATEST: ResourceVersion = ResourceVersion::Latest;

    /// Create a finite version. Fails for values below 1.
    pub fn new(version: i64) -> VfsResult<Self> {
        if version < 1 {
            return Err(VfsError::invalid_input(format!(
                "resource version must be greater than 0, got {version}"
            )));
        }
        Ok(Self::Finite(version as u64))
    }

    /// The numeric value, or `None` for the sentinel.
    pub fn number(&self) -> Option<u64> {
        match self {
            Self::Finite(n) => Some(*n),
            Self::Latest => None,
        }
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, Self::Latest)
    }

    /// Increment in place. The sentinel stays the sentinel.
    pub fn bump(&mut self) {
        if let Self::Finite(n) = self {
            *n = n.saturating_add(1);
        }
    }

    pub fn is_newer(&self, other: &Self) -> bool {
        self > other
    }

    pub fn is_older(&self, other: &Self) -> bool {
        self < other
    }

    /// Manifest representation: an integer, or `"latest"` for the sentinel.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Finite(n) => Value::from(*n),
            Self::Latest => Value::from(LATEST_TAG),
        }
    }

    /// Parse the manifest representation.
    ///
    /// Accepts integers, numeric strings (`"3"`), and `"latest"`.
    pub fn from_value(value: &Value) -> VfsResult<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(n) => Self::new(n),
                None => Err(VfsError::invalid_input(format!(
                    "resource version is not an integer: {n}"
                ))),
            },
            Value::String(s) if s.eq_ignore_ascii_case(LATEST_TAG) => Ok(Self::Latest),
            Value::String(s) => {
                let n = s.trim().parse::<i64>().map_err(|_| {
                    VfsError::invalid_input(format!("resource version is not numeric: {s:?}"))
                })?;
                Self::new(n)
            }
            other => Err(VfsError::invalid_input(format!(
                "resource version has unexpected type: {other}"
            ))),
        }
    }
}

impl Ord for ResourceVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Finite(a), Self::Finite(b)) => a.cmp(b),
            (Self::Finite(_), Self::Latest) => Ordering::Less,
            (Self::Latest, Self::Finite(_)) => Ordering::Greater,
            (Self::Latest, Self::Latest) => Ordering::Equal,
        }
    }
}

impl PartialOrd for ResourceVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(n) => write!(f, "{n}"),
            Self::Latest => f.write_str(LATEST_TAG),
        }
    }
}
