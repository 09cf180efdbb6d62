//! Execution context
//!
//! Every dataset read or write a task performs goes through an
//! [`ExecutionContext`]. The context records which version of each input
//! storage returned and attaches that record, plus any annotations, to every
//! dataset the task writes.
//!
//! There are exactly two ways to build one:
//! - [`ExecutionContext::from_full`]: unrestricted client; any ref may be read
//!   or written and the catalog may be queried.
//! - [`ExecutionContext::from_limited`]: restricted client; only refs the
//!   quantum declares may be touched.
//!
//! A context serves a single quantum attempt on a single thread and is
//! consumed by [`ExecutionContext::finish`].

use crate::error::{ExecutionError, StorageError};
use crate::provenance::{DatasetProvenance, ProvenanceAccumulator};
use crate::storage::{FullStorage, LimitedStorage, StoredDataset};
use quanta_core::{DatasetRef, DimensionUniverse, Quantum, QuantumId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Which client a context was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    Full,
    Limited,
}

enum Client {
    Full(Arc<dyn FullStorage>),
    Limited(Arc<dyn LimitedStorage>),
}

impl Client {
    fn get(&self, dataset: &DatasetRef) -> Result<StoredDataset, StorageError> {
        match self {
            Client::Full(c) => c.get(dataset),
            Client::Limited(c) => c.get(dataset),
        }
    }

    fn put(&self, dataset: &DatasetRef, value: Value, provenance: &DatasetProvenance) -> Result<DatasetRef, StorageError> {
        match self {
            Client::Full(c) => c.put(dataset, value, provenance),
            Client::Limited(c) => c.put(dataset, value, provenance),
        }
    }
}

/// Everything a finished attempt hands back to the driver
#[derive(Debug, Clone, PartialEq)]
pub struct QuantumProvenance {
    pub quantum: QuantumId,
    pub provenance: DatasetProvenance,
    pub outputs_written: Vec<DatasetRef>,
}

pub struct ExecutionContext {
    client: Client,
    quantum: Quantum,
    universe: Arc<DimensionUniverse>,
    provenance: ProvenanceAccumulator,
    written: Vec<DatasetRef>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("capability", &self.capability())
            .field("quantum", &self.quantum.id)
            .field("written", &self.written.len())
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Context over an unrestricted client (direct or debug execution).
    #[must_use]
    pub fn from_full(client: Arc<dyn FullStorage>, quantum: &Quantum, universe: Arc<DimensionUniverse>) -> Self {
        Self::with_client(Client::Full(client), quantum, universe)
    }

    /// Context over a restricted client (batch execution).
    #[must_use]
    pub fn from_limited(client: Arc<dyn LimitedStorage>, quantum: &Quantum, universe: Arc<DimensionUniverse>) -> Self {
        Self::with_client(Client::Limited(client), quantum, universe)
    }

    fn with_client(client: Client, quantum: &Quantum, universe: Arc<DimensionUniverse>) -> Self {
        Self {
            client,
            quantum: quantum.clone(),
            universe,
            provenance: ProvenanceAccumulator::new(quantum.id, quantum.task.clone()),
            written: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn capability(&self) -> Capability {
        match self.client {
            Client::Full(_) => Capability::Full,
            Client::Limited(_) => Capability::Limited,
        }
    }

    #[inline]
    #[must_use]
    pub fn quantum(&self) -> &Quantum {
        &self.quantum
    }

    /// Read-only handle to the dimension universe.
    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> &DimensionUniverse {
        &self.universe
    }

    fn denied(&self, dataset: &DatasetRef, operation: &'static str) -> ExecutionError {
        tracing::warn!(
            quantum = %self.quantum,
            dataset = %dataset,
            operation,
            "undeclared dataset access rejected"
        );
        ExecutionError::Permission {
            dataset: dataset.to_string(),
            operation,
            quantum: self.quantum.to_string(),
        }
    }

    /// The graph's copy of a declared ref, or `dataset` itself under a full
    /// client. `None` means the access is not permitted.
    fn resolve_input(&self, dataset: &DatasetRef) -> Option<DatasetRef> {
        if self.quantum.declares_input(dataset) {
            return self.quantum.resolve(dataset).cloned();
        }
        match self.client {
            Client::Full(_) => Some(dataset.clone()),
            Client::Limited(_) => None,
        }
    }

    fn resolve_output(&self, dataset: &DatasetRef) -> Option<DatasetRef> {
        if self.quantum.declares_output(dataset) {
            return self.quantum.resolve(dataset).cloned();
        }
        match self.client {
            Client::Full(_) => Some(dataset.clone()),
            Client::Limited(_) => None,
        }
    }

    /// Read a dataset and record the version storage returned.
    ///
    /// # Errors
    /// [`ExecutionError::Permission`] for an undeclared input under a limited
    /// client; [`ExecutionError::DatasetNotFound`] if storage has no version.
    pub fn get(&mut self, dataset: &DatasetRef) -> Result<Value, ExecutionError> {
        let target = self
            .resolve_input(dataset)
            .ok_or_else(|| self.denied(dataset, "get"))?;
        let stored = self.client.get(&target).map_err(ExecutionError::from_storage)?;
        tracing::debug!(quantum = %self.quantum, dataset = %stored.dataset, "dataset read");
        self.provenance.record_read(&target, stored.version);
        Ok(stored.value)
    }

    /// Write a dataset with the provenance accumulated so far.
    ///
    /// Nothing is retried; a backend failure propagates and nothing is
    /// committed for this dataset.
    ///
    /// # Errors
    /// [`ExecutionError::Permission`] for an undeclared output under a limited
    /// client; [`ExecutionError::StorageWrite`] on backend failure.
    pub fn put(&mut self, dataset: &DatasetRef, value: Value) -> Result<DatasetRef, ExecutionError> {
        let target = self
            .resolve_output(dataset)
            .ok_or_else(|| self.denied(dataset, "put"))?;
        let snapshot = self.provenance.snapshot();
        let stored = self
            .client
            .put(&target, value, &snapshot)
            .map_err(|e| {
                tracing::error!(quantum = %self.quantum, dataset = %target, error = %e, "dataset write failed");
                ExecutionError::from_storage(e)
            })?;
        self.written.push(stored.clone());
        Ok(stored)
    }

    fn check_annotatable(&self, dataset: &DatasetRef) -> Result<(), ExecutionError> {
        let declared = self.quantum.declares_input(dataset) || self.quantum.declares_output(dataset);
        match self.client {
            Client::Limited(_) if !declared => Err(self.denied(dataset, "annotate")),
            _ => Ok(()),
        }
    }

    /// Attach `key = value` to the provenance of `dataset`. An existing key
    /// is kept and `Ok(false)` returned; see
    /// [`replace_additional_provenance`](Self::replace_additional_provenance).
    ///
    /// # Errors
    /// [`ExecutionError::Permission`] for an undeclared ref under a limited client.
    pub fn add_additional_provenance(
        &mut self,
        dataset: &DatasetRef,
        key: &str,
        value: Value,
    ) -> Result<bool, ExecutionError> {
        self.check_annotatable(dataset)?;
        Ok(self.provenance.add_extra(dataset, key, value))
    }

    /// Attach `key = value`, overwriting any previous value.
    ///
    /// # Errors
    /// [`ExecutionError::Permission`] for an undeclared ref under a limited client.
    pub fn replace_additional_provenance(
        &mut self,
        dataset: &DatasetRef,
        key: &str,
        value: Value,
    ) -> Result<Option<Value>, ExecutionError> {
        self.check_annotatable(dataset)?;
        Ok(self.provenance.replace_extra(dataset, key, value))
    }

    /// Catalog query; only a full client can do this.
    ///
    /// # Errors
    /// [`ExecutionError::Permission`] under a limited client.
    pub fn query_datasets(&self, dataset_type: &str) -> Result<Vec<DatasetRef>, ExecutionError> {
        match &self.client {
            Client::Full(c) => Ok(c.query_datasets(dataset_type)),
            Client::Limited(_) => Err(ExecutionError::Permission {
                dataset: dataset_type.to_string(),
                operation: "query",
                quantum: self.quantum.to_string(),
            }),
        }
    }

    /// Provenance accumulated so far.
    #[must_use]
    pub fn provenance(&self) -> DatasetProvenance {
        self.provenance.snapshot()
    }

    #[inline]
    #[must_use]
    pub fn outputs_written(&self) -> &[DatasetRef] {
        &self.written
    }

    /// End the attempt, releasing the accumulator.
    #[must_use]
    pub fn finish(self) -> QuantumProvenance {
        QuantumProvenance {
            quantum: self.quantum.id,
            provenance: self.provenance.into_provenance(),
            outputs_written: self.written,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use quanta_core::DataCoordinate;
    use serde_json::json;

    fn universe() -> Arc<DimensionUniverse> {
        Arc::new(DimensionUniverse::builder().dimension("visit", &[]).build().unwrap())
    }

    fn r(name: &str) -> DatasetRef {
        DatasetRef::predicted(name, DataCoordinate::empty().with("visit", 1), "run")
    }

    fn setup() -> (Arc<InMemoryStore>, Quantum) {
        let store = Arc::new(InMemoryStore::new());
        store.insert(r("in"), json!(1));
        store.insert(r("undeclared"), json!(2));
        let quantum = Quantum::new("t", DataCoordinate::empty().with("visit", 1))
            .with_inputs(vec![r("in")])
            .with_outputs(vec![r("out")]);
        (store, quantum)
    }

    #[test]
    fn limited_rejects_undeclared_get() {
        let (store, quantum) = setup();
        let mut ctx = ExecutionContext::from_limited(store, &quantum, universe());
        assert_eq!(ctx.capability(), Capability::Limited);
        assert!(matches!(
            ctx.get(&r("undeclared")),
            Err(ExecutionError::Permission { operation: "get", .. })
        ));
        assert_eq!(ctx.get(&r("in")).unwrap(), json!(1));
    }

    #[test]
    fn full_allows_undeclared_get() {
        let (store, quantum) = setup();
        let mut ctx = ExecutionContext::from_full(store, &quantum, universe());
        assert_eq!(ctx.get(&r("undeclared")).unwrap(), json!(2));
        assert!(ctx.provenance().input(&r("undeclared")).is_some());
    }

    #[test]
    fn limited_rejects_undeclared_put_and_query() {
        let (store, quantum) = setup();
        let mut ctx = ExecutionContext::from_limited(store.clone(), &quantum, universe());
        assert!(matches!(
            ctx.put(&r("elsewhere"), json!(0)),
            Err(ExecutionError::Permission { operation: "put", .. })
        ));
        assert!(!store.contains(&r("elsewhere")));
        assert!(matches!(ctx.query_datasets("in"), Err(ExecutionError::Permission { .. })));
        assert!(matches!(
            ctx.add_additional_provenance(&r("undeclared"), "k", json!("v")),
            Err(ExecutionError::Permission { .. })
        ));
    }

    #[test]
    fn put_attaches_accumulated_provenance() {
        let (store, quantum) = setup();
        let mut ctx = ExecutionContext::from_limited(store.clone(), &quantum, universe());
        ctx.get(&r("in")).unwrap();
        assert!(ctx.add_additional_provenance(&r("in"), "k", json!("v")).unwrap());
        let written = ctx.put(&r("out"), json!({"sum": 1})).unwrap();
        assert_eq!(written.id, quantum.outputs[0].id);

        let prov = store.provenance_of(&written).unwrap();
        assert_eq!(prov.quantum, Some(quantum.id));
        let input = prov.input(&r("in")).unwrap();
        assert!(input.version.is_some());
        assert_eq!(input.extra["k"], json!("v"));

        let done = ctx.finish();
        assert_eq!(done.outputs_written, vec![written]);
    }

    #[test]
    fn missing_input_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let quantum = Quantum::new("t", DataCoordinate::empty()).with_inputs(vec![r("in")]);
        let mut ctx = ExecutionContext::from_limited(store, &quantum, universe());
        assert!(matches!(ctx.get(&r("in")), Err(ExecutionError::DatasetNotFound(_))));
        assert!(ctx.provenance().is_empty());
    }

    #[test]
    fn write_failure_is_storage_write() {
        let (store, quantum) = setup();
        store.fail_writes_for("out");
        let mut ctx = ExecutionContext::from_full(store.clone(), &quantum, universe());
        let err = ctx.put(&r("out"), json!(0)).unwrap_err();
        assert!(err.is_retryable());
        assert!(ctx.outputs_written().is_empty());
        assert!(!store.contains(&r("out")));
    }
}
