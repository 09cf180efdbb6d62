//! Dataset provenance captured during one quantum attempt
//!
//! The [`ProvenanceAccumulator`] lives inside an execution context and is
//! dropped with it. Every `put` attaches a [`DatasetProvenance`] snapshot:
//! each dataset read so far with the version storage returned, plus any
//! additional key/value annotations the task attached.

use quanta_core::{DatasetRef, DatasetVersion, QuantumId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Provenance of one consumed (or annotated) dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputProvenance {
    pub dataset: DatasetRef,
    /// `None` when the dataset was annotated but never read
    pub version: Option<DatasetVersion>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

/// Provenance attached to a written dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetProvenance {
    pub quantum: Option<QuantumId>,
    pub task: Option<String>,
    pub inputs: Vec<InputProvenance>,
}

impl DatasetProvenance {
    #[must_use]
    pub fn input(&self, dataset: &DatasetRef) -> Option<&InputProvenance> {
        self.inputs.iter().find(|p| &p.dataset == dataset)
    }

    /// Refs that were actually read.
    pub fn consumed(&self) -> impl Iterator<Item = &DatasetRef> {
        self.inputs
            .iter()
            .filter(|p| p.version.is_some())
            .map(|p| &p.dataset)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Scoped per-attempt accumulator
#[derive(Debug, Default)]
pub struct ProvenanceAccumulator {
    quantum: Option<QuantumId>,
    task: Option<String>,
    entries: BTreeMap<DatasetRef, InputProvenance>,
}

impl ProvenanceAccumulator {
    #[must_use]
    pub fn new(quantum: QuantumId, task: impl Into<String>) -> Self {
        Self {
            quantum: Some(quantum),
            task: Some(task.into()),
            entries: BTreeMap::new(),
        }
    }

    fn entry(&mut self, dataset: &DatasetRef) -> &mut InputProvenance {
        self.entries
            .entry(dataset.clone())
            .or_insert_with(|| InputProvenance {
                dataset: dataset.clone(),
                version: None,
                extra: BTreeMap::new(),
            })
    }

    /// Record that `dataset` was read at `version`.
    pub fn record_read(&mut self, dataset: &DatasetRef, version: DatasetVersion) {
        self.entry(dataset).version = Some(version);
    }

    /// Attach `key = value` to `dataset`. An existing key is kept and
    /// `false` returned.
    pub fn add_extra(&mut self, dataset: &DatasetRef, key: &str, value: Value) -> bool {
        let extra = &mut self.entry(dataset).extra;
        if extra.contains_key(key) {
            return false;
        }
        extra.insert(key.to_string(), value);
        true
    }

    /// Attach `key = value` to `dataset`, returning any previous value.
    pub fn replace_extra(&mut self, dataset: &DatasetRef, key: &str, value: Value) -> Option<Value> {
        self.entry(dataset).extra.insert(key.to_string(), value)
    }

    #[must_use]
    pub fn snapshot(&self) -> DatasetProvenance {
        DatasetProvenance {
            quantum: self.quantum,
            task: self.task.clone(),
            inputs: self.entries.values().cloned().collect(),
        }
    }

    #[must_use]
    pub fn into_provenance(self) -> DatasetProvenance {
        DatasetProvenance {
            quantum: self.quantum,
            task: self.task,
            inputs: self.entries.into_values().collect(),
        }
    }
}
