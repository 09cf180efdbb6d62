//! Storage capability contract
//!
//! Two capability levels:
//! - [`LimitedStorage`]: get/put by exact ref, with provenance attached on put.
//!   This is all a task running in batch sees.
//! - [`FullStorage`]: adds catalog queries and provenance lookups, for direct
//!   or debug execution.
//!
//! [`InMemoryStore`] implements both and is used by tests and the reference
//! driver.

use crate::error::StorageError;
use crate::provenance::DatasetProvenance;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use quanta_core::{DatasetQuery, DatasetRef, DatasetVersion};
use serde_json::Value;

/// A dataset as returned by storage
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDataset {
    pub dataset: DatasetRef,
    pub version: DatasetVersion,
    pub value: Value,
}

/// Get/put by exact ref
pub trait LimitedStorage: Send + Sync {
    /// Read the version identified by `dataset.id`, or the newest version of
    /// the logical dataset when that handle is unknown.
    ///
    /// # Errors
    /// [`StorageError::NotFound`] when no version exists.
    fn get(&self, dataset: &DatasetRef) -> Result<StoredDataset, StorageError>;

    /// Write `value` with its provenance; both commit or neither does.
    ///
    /// # Errors
    /// [`StorageError::AlreadyExists`] if the handle was written before, or
    /// [`StorageError::WriteFailed`] on backend failure.
    fn put(&self, dataset: &DatasetRef, value: Value, provenance: &DatasetProvenance) -> Result<DatasetRef, StorageError>;
}

/// Unrestricted storage client
pub trait FullStorage: LimitedStorage {
    /// Every stored dataset of `dataset_type`, all versions.
    fn query_datasets(&self, dataset_type: &str) -> Vec<DatasetRef>;

    /// Provenance attached when `dataset` was written.
    fn provenance_of(&self, dataset: &DatasetRef) -> Option<DatasetProvenance>;
}

#[derive(Debug, Clone)]
struct Entry {
    dataset: DatasetRef,
    version: DatasetVersion,
    value: Value,
    provenance: DatasetProvenance,
}

/// Concurrent in-memory store
///
/// Versions of one logical dataset (same type and coordinate) are kept in
/// write order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    datasets: DashMap<DatasetRef, Vec<Entry>>,
    failing_types: DashSet<String>,
}

fn checksum(value: &Value) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a dataset that exists before any graph runs. A ref without a
    /// production time is stamped with the current time.
    pub fn insert(&self, dataset: DatasetRef, value: Value) -> DatasetRef {
        let dataset = match dataset.produced_at {
            Some(_) => dataset,
            None => dataset.produced(Utc::now()),
        };
        let version = DatasetVersion::of(&dataset).with_checksum(checksum(&value));
        self.datasets.entry(dataset.clone()).or_default().push(Entry {
            dataset: dataset.clone(),
            version,
            value,
            provenance: DatasetProvenance::default(),
        });
        dataset
    }

    /// Make every subsequent write of `dataset_type` fail.
    pub fn fail_writes_for(&self, dataset_type: impl Into<String>) {
        self.failing_types.insert(dataset_type.into());
    }

    pub fn clear_write_failures(&self) {
        self.failing_types.clear();
    }

    /// Whether any version of the logical dataset exists.
    #[must_use]
    pub fn contains(&self, dataset: &DatasetRef) -> bool {
        self.datasets.get(dataset).is_some_and(|v| !v.is_empty())
    }

    /// Number of stored versions across all datasets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.datasets.iter().map(|e| e.value().len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LimitedStorage for InMemoryStore {
    fn get(&self, dataset: &DatasetRef) -> Result<StoredDataset, StorageError> {
        let versions = self
            .datasets
            .get(dataset)
            .ok_or_else(|| StorageError::NotFound(dataset.to_string()))?;
        let entry = versions
            .iter()
            .find(|e| e.dataset.id == dataset.id)
            .or_else(|| versions.last())
            .ok_or_else(|| StorageError::NotFound(dataset.to_string()))?;
        Ok(StoredDataset {
            dataset: entry.dataset.clone(),
            version: entry.version.clone(),
            value: entry.value.clone(),
        })
    }

    fn put(&self, dataset: &DatasetRef, value: Value, provenance: &DatasetProvenance) -> Result<DatasetRef, StorageError> {
        if self.failing_types.contains(&dataset.dataset_type) {
            tracing::warn!(dataset = %dataset, "injected write failure");
            return Err(StorageError::WriteFailed {
                dataset: dataset.to_string(),
                reason: "write rejected by backend".to_string(),
            });
        }

        let mut versions = self.datasets.entry(dataset.clone()).or_default();
        if versions.iter().any(|e| e.dataset.id == dataset.id) {
            return Err(StorageError::AlreadyExists(dataset.to_string()));
        }
        let stored = dataset.clone().produced(Utc::now());
        let version = DatasetVersion::of(&stored).with_checksum(checksum(&value));
        versions.push(Entry {
            dataset: stored.clone(),
            version,
            value,
            provenance: provenance.clone(),
        });
        tracing::debug!(dataset = %stored, "dataset written");
        Ok(stored)
    }
}

impl FullStorage for InMemoryStore {
    fn query_datasets(&self, dataset_type: &str) -> Vec<DatasetRef> {
        let mut out: Vec<DatasetRef> = self
            .datasets
            .iter()
            .filter(|e| e.key().dataset_type == dataset_type)
            .flat_map(|e| e.value().iter().map(|v| v.dataset.clone()).collect::<Vec<_>>())
            .collect();
        out.sort();
        out
    }

    fn provenance_of(&self, dataset: &DatasetRef) -> Option<DatasetProvenance> {
        let versions = self.datasets.get(dataset)?;
        versions
            .iter()
            .find(|e| e.dataset.id == dataset.id)
            .or_else(|| versions.last())
            .map(|e| e.provenance.clone())
    }
}

impl DatasetQuery for InMemoryStore {
    fn datasets_of_type(&self, dataset_type: &str) -> Vec<DatasetRef> {
        self.query_datasets(dataset_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quanta_core::DataCoordinate;
    use serde_json::json;

    fn r(name: &str) -> DatasetRef {
        DatasetRef::predicted(name, DataCoordinate::empty().with("visit", 1), "run")
    }

    #[test]
    fn put_then_get_returns_version() {
        let store = InMemoryStore::new();
        let written = store.put(&r("a"), json!({"x": 1}), &DatasetProvenance::default()).unwrap();
        assert!(written.produced_at.is_some());

        let got = store.get(&r("a")).unwrap();
        assert_eq!(got.value, json!({"x": 1}));
        assert_eq!(got.version.id, written.id);
        assert!(got.version.checksum.is_some());
    }

    #[test]
    fn same_handle_cannot_be_written_twice() {
        let store = InMemoryStore::new();
        let dataset = r("a");
        store.put(&dataset, json!(1), &DatasetProvenance::default()).unwrap();
        assert!(matches!(
            store.put(&dataset, json!(2), &DatasetProvenance::default()),
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[test]
    fn get_prefers_exact_handle() {
        let store = InMemoryStore::new();
        let first = store.insert(r("a"), json!("old"));
        let _second = store.insert(r("a"), json!("new"));
        assert_eq!(store.get(&first).unwrap().value, json!("old"));
        // unknown handle falls back to the newest version
        assert_eq!(store.get(&r("a")).unwrap().value, json!("new"));
        assert_eq!(store.query_datasets("a").len(), 2);
    }

    #[test]
    fn injected_failure_commits_nothing() {
        let store = InMemoryStore::new();
        store.fail_writes_for("a");
        assert!(matches!(
            store.put(&r("a"), json!(1), &DatasetProvenance::default()),
            Err(StorageError::WriteFailed { .. })
        ));
        assert!(!store.contains(&r("a")));
        store.clear_write_failures();
        assert!(store.put(&r("a"), json!(1), &DatasetProvenance::default()).is_ok());
    }

    #[test]
    fn missing_dataset_is_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(store.get(&r("zzz")), Err(StorageError::NotFound(_))));
        assert!(store.provenance_of(&r("zzz")).is_none());
    }
}
