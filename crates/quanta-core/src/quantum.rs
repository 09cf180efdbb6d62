//! Quanta: one task invocation on one data coordinate

use crate::coordinate::DataCoordinate;
use crate::dataset::DatasetRef;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuantumId(pub Uuid);

impl QuantumId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QuantumId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for QuantumId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work. Immutable once the graph is built; execution status
/// lives in the provenance graph, never here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantum {
    pub id: QuantumId,
    pub task: String,
    pub coordinate: DataCoordinate,
    pub inputs: Vec<DatasetRef>,
    pub prerequisites: Vec<DatasetRef>,
    pub outputs: Vec<DatasetRef>,
    pub init_inputs: Vec<DatasetRef>,
}

impl Quantum {
    #[must_use]
    pub fn new(task: impl Into<String>, coordinate: DataCoordinate) -> Self {
        Self {
            id: QuantumId::new(),
            task: task.into(),
            coordinate,
            inputs: Vec::new(),
            prerequisites: Vec::new(),
            outputs: Vec::new(),
            init_inputs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: Vec<DatasetRef>) -> Self {
        self.inputs = inputs;
        self
    }

    #[must_use]
    pub fn with_prerequisites(mut self, prerequisites: Vec<DatasetRef>) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    #[must_use]
    pub fn with_outputs(mut self, outputs: Vec<DatasetRef>) -> Self {
        self.outputs = outputs;
        self
    }

    #[must_use]
    pub fn with_init_inputs(mut self, init_inputs: Vec<DatasetRef>) -> Self {
        self.init_inputs = init_inputs;
        self
    }

    /// Regular inputs followed by prerequisites.
    pub fn all_inputs(&self) -> impl Iterator<Item = &DatasetRef> {
        self.inputs.iter().chain(self.prerequisites.iter())
    }

    /// Whether `dataset` is something this quantum may read.
    #[must_use]
    pub fn declares_input(&self, dataset: &DatasetRef) -> bool {
        self.all_inputs().chain(self.init_inputs.iter()).any(|r| r == dataset)
    }

    /// Whether `dataset` is something this quantum may write.
    #[must_use]
    pub fn declares_output(&self, dataset: &DatasetRef) -> bool {
        self.outputs.iter().any(|r| r == dataset)
    }

    /// Resolve a declared ref by equality, returning the graph's own copy.
    #[must_use]
    pub fn resolve(&self, dataset: &DatasetRef) -> Option<&DatasetRef> {
        self.all_inputs()
            .chain(self.init_inputs.iter())
            .chain(self.outputs.iter())
            .find(|r| *r == dataset)
    }
}

impl Display for Quantum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.task, self.coordinate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_refs_are_matched_by_value() {
        let coord = DataCoordinate::empty().with("visit", 1);
        let input = DatasetRef::predicted("raw", coord.clone(), "r");
        let prereq = DatasetRef::predicted("bias", DataCoordinate::empty(), "calib");
        let output = DatasetRef::predicted("calexp", coord.clone(), "r");
        let q = Quantum::new("isr", coord.clone())
            .with_inputs(vec![input.clone()])
            .with_prerequisites(vec![prereq.clone()])
            .with_outputs(vec![output.clone()]);

        let probe = DatasetRef::predicted("raw", coord, "elsewhere");
        assert!(q.declares_input(&probe));
        assert!(q.declares_input(&prereq));
        assert!(!q.declares_input(&output));
        assert!(q.declares_output(&output));
        assert_eq!(q.resolve(&probe).unwrap().id, input.id);
        assert_eq!(q.to_string(), "isr{visit: 1}");
    }
}
