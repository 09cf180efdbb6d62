//! Data coordinates
//!
//! A [`DataCoordinate`] identifies a dataset or quantum by its values along a
//! set of named dimensions (`instrument`, `visit`, `tract`, `patch`, ...).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};

/// Value of one dimension in a coordinate
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimensionValue {
    Int(i64),
    Str(String),
}

impl Display for DimensionValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for DimensionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for DimensionValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for DimensionValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for DimensionValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for DimensionValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Mapping from dimension name to value, ordered by name
///
/// Construction does not validate against a universe; use
/// [`DimensionUniverse::normalize`](crate::DimensionUniverse::normalize) for that.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataCoordinate(BTreeMap<String, DimensionValue>);

impl DataCoordinate {
    /// The empty coordinate used by global (dimensionless) quanta and datasets.
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder-style insertion
    #[inline]
    #[must_use]
    pub fn with(mut self, dimension: impl Into<String>, value: impl Into<DimensionValue>) -> Self {
        self.0.insert(dimension.into(), value.into());
        self
    }

    pub fn insert(&mut self, dimension: impl Into<String>, value: impl Into<DimensionValue>) {
        self.0.insert(dimension.into(), value.into());
    }

    #[inline]
    #[must_use]
    pub fn get(&self, dimension: &str) -> Option<&DimensionValue> {
        self.0.get(dimension)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DimensionValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Dimension names present in this coordinate.
    #[must_use]
    pub fn dimensions(&self) -> BTreeSet<String> {
        self.0.keys().cloned().collect()
    }

    /// Project onto `dimensions`, dropping every other key.
    #[must_use]
    pub fn subset(&self, dimensions: &BTreeSet<String>) -> DataCoordinate {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| dimensions.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// True when every dimension shared with `other` has the same value.
    #[must_use]
    pub fn is_compatible(&self, other: &DataCoordinate) -> bool {
        self.0
            .iter()
            .all(|(k, v)| other.0.get(k).map_or(true, |o| o == v))
    }

    /// True when this coordinate carries values for all of `dimensions`.
    #[must_use]
    pub fn covers(&self, dimensions: &BTreeSet<String>) -> bool {
        dimensions.iter().all(|d| self.0.contains_key(d))
    }
}

impl Display for DataCoordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}

impl<K, V> FromIterator<(K, V)> for DataCoordinate
where
    K: Into<String>,
    V: Into<DimensionValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
