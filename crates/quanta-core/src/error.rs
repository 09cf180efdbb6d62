//! Error types for Quanta Core
//!
//! Covers:
//! - Dimension universe construction and coordinate validation
//! - Task connection declaration
//! - Quantum graph construction
//! - Build configuration loading

/// Errors raised while building a universe or validating coordinates
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DimensionError {
    /// Coordinate or declaration names a dimension the universe does not know
    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    /// A dimension is present but one it requires is not
    #[error("dimension {dimension} requires {required}, which is missing")]
    MissingRequired { dimension: String, required: String },

    /// The same dimension was declared twice
    #[error("dimension declared twice: {0}")]
    DuplicateDimension(String),

    /// A region was registered for a dimension that is not spatial
    #[error("dimension {0} is not spatial")]
    NotSpatial(String),
}

/// Errors raised while declaring task connections
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("task label must not be empty")]
    EmptyLabel,

    #[error("connection name already declared: {0}")]
    DuplicateName(String),

    #[error("no connection named {0}")]
    UnknownName(String),

    /// Init inputs/outputs are global and cannot carry dimensions
    #[error("init connection {name} must be dimensionless")]
    InitConnectionHasDimensions { name: String },

    /// Prerequisites come from storage; a task in the same graph cannot make them
    #[error("prerequisite {name} is produced by task {producer} in the same graph")]
    PrerequisiteProducedInGraph { name: String, producer: String },

    /// Per-quantum outputs must be identifiable from the quantum coordinate
    #[error("output {name} has dimension {dimension} outside the task dimensions")]
    OutputDimensionOutsideTask { name: String, dimension: String },
}

/// Errors raised by [`GraphBuilder::build`](crate::GraphBuilder::build)
///
/// Construction never returns a partial graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphConstructionError {
    /// Two tasks declare the same output dataset type
    #[error("dataset type {dataset_type} is produced by both {first} and {second}")]
    DuplicateOutput {
        dataset_type: String,
        first: String,
        second: String,
    },

    /// Two task definitions share a label
    #[error("task label used twice: {0}")]
    DuplicateTask(String),

    /// A quantum names a task label the graph does not define
    #[error("quantum {quantum} belongs to unknown task {task}")]
    UnknownTask { quantum: String, task: String },

    /// Two quanta would write the same dataset
    #[error("output {dataset} claimed by more than one quantum (tasks {first} and {second})")]
    OutputCollision {
        dataset: String,
        first: String,
        second: String,
    },

    /// A required input did not resolve to exactly one dataset
    #[error("input {connection} of task {task} at {coordinate} resolved to {found} datasets, expected exactly one")]
    UnresolvedInput {
        task: String,
        connection: String,
        coordinate: String,
        found: usize,
    },

    /// Several versions of one dataset tie on production time
    #[error("ambiguous dataset {dataset_type} at {coordinate}: {candidates} versions with equal production time")]
    AmbiguousDataset {
        dataset_type: String,
        coordinate: String,
        candidates: usize,
    },

    /// The derived dependency graph is not acyclic
    #[error("cyclic dependency involving {0}")]
    Cycle(String),

    /// A task's connections are inconsistent with its dimensions
    #[error("invalid connections for task {task}: {source}")]
    InvalidConnections {
        task: String,
        #[source]
        source: ConnectionError,
    },

    /// A dataset or quantum coordinate failed universe validation
    #[error("dimension error: {0}")]
    Dimension(#[from] DimensionError),
}

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_output_message_names_both_tasks() {
        let err = GraphConstructionError::DuplicateOutput {
            dataset_type: "calexp".into(),
            first: "isr".into(),
            second: "calibrate".into(),
        };
        assert_eq!(
            err.to_string(),
            "dataset type calexp is produced by both isr and calibrate"
        );
    }

    #[test]
    fn dimension_error_converts() {
        let err: GraphConstructionError = DimensionError::UnknownDimension("exposure".into()).into();
        assert!(matches!(err, GraphConstructionError::Dimension(_)));
        assert_eq!(err.to_string(), "dimension error: unknown dimension: exposure");
    }
}
