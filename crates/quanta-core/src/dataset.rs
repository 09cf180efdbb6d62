//! Dataset types and references

use crate::coordinate::DataCoordinate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Storage handle of one concrete dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub Uuid);

impl DatasetId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DatasetId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DatasetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named kind of dataset with its dimensions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetType {
    pub name: String,
    pub dimensions: BTreeSet<String>,
    pub storage_class: String,
}

impl DatasetType {
    #[must_use]
    pub fn new(name: impl Into<String>, dimensions: &[&str], storage_class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dimensions: dimensions.iter().map(|d| (*d).to_string()).collect(),
            storage_class: storage_class.into(),
        }
    }

    /// A dimensionless dataset type (init outputs, configs, packages).
    #[must_use]
    pub fn global(name: impl Into<String>, storage_class: impl Into<String>) -> Self {
        Self::new(name, &[], storage_class)
    }

    #[inline]
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.dimensions.is_empty()
    }
}

/// Immutable reference to one dataset
///
/// Equality, hashing and ordering use only the dataset type name and the
/// data coordinate; two versions of the same logical dataset compare equal.
/// `produced_at` is `None` for refs predicted by a graph and not yet written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRef {
    pub dataset_type: String,
    pub coordinate: DataCoordinate,
    pub id: DatasetId,
    pub run: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produced_at: Option<DateTime<Utc>>,
}

impl DatasetRef {
    /// A ref predicted by graph construction, to be written in `run`.
    #[must_use]
    pub fn predicted(dataset_type: impl Into<String>, coordinate: DataCoordinate, run: impl Into<String>) -> Self {
        Self {
            dataset_type: dataset_type.into(),
            coordinate,
            id: DatasetId::new(),
            run: run.into(),
            produced_at: None,
        }
    }

    /// A ref to a dataset already present in storage.
    #[must_use]
    pub fn existing(
        dataset_type: impl Into<String>,
        coordinate: DataCoordinate,
        run: impl Into<String>,
        produced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            dataset_type: dataset_type.into(),
            coordinate,
            id: DatasetId::new(),
            run: run.into(),
            produced_at: Some(produced_at),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_predicted(&self) -> bool {
        self.produced_at.is_none()
    }

    /// Same ref marked as produced at `at`.
    #[must_use]
    pub fn produced(mut self, at: DateTime<Utc>) -> Self {
        self.produced_at = Some(at);
        self
    }
}

impl PartialEq for DatasetRef {
    fn eq(&self, other: &Self) -> bool {
        self.dataset_type == other.dataset_type && self.coordinate == other.coordinate
    }
}

impl Eq for DatasetRef {}

impl Hash for DatasetRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dataset_type.hash(state);
        self.coordinate.hash(state);
    }
}

impl PartialOrd for DatasetRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DatasetRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dataset_type
            .cmp(&other.dataset_type)
            .then_with(|| self.coordinate.cmp(&other.coordinate))
    }
}

impl Display for DatasetRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.dataset_type, self.coordinate)
    }
}

/// Concrete version of a dataset as returned by storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetVersion {
    pub id: DatasetId,
    pub run: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produced_at: Option<DateTime<Utc>>,
    /// Hex content checksum computed by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl DatasetVersion {
    #[must_use]
    pub fn of(dataset: &DatasetRef) -> Self {
        Self {
            id: dataset.id,
            run: dataset.run.clone(),
            produced_at: dataset.produced_at,
            checksum: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}
