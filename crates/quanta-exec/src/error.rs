//! Error types for Quanta Exec

use quanta_core::QuantumId;

/// Errors raised by a storage backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("dataset not found: {0}")]
    NotFound(String),

    /// Datasets are immutable; a handle can only be written once
    #[error("dataset already exists: {0}")]
    AlreadyExists(String),

    #[error("backend write failed for {dataset}: {reason}")]
    WriteFailed { dataset: String, reason: String },
}

/// Errors raised through an [`ExecutionContext`](crate::ExecutionContext)
/// or while preparing a quantum for execution
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Storage has no dataset for the requested ref
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    /// Operation not allowed under the context's capability
    #[error("permission denied: {operation} of {dataset} is not declared by quantum {quantum}")]
    Permission {
        dataset: String,
        operation: &'static str,
        quantum: String,
    },

    /// Backend write failure; the dataset was not committed
    #[error("storage write failed for {dataset}: {reason}")]
    StorageWrite { dataset: String, reason: String },

    /// The factory could not build the task
    #[error("failed to construct task {task}: {reason}")]
    TaskConstruction { task: String, reason: String },

    #[error("quantum {0} is not in the graph")]
    UnknownQuantum(QuantumId),

    #[error("metadata encoding failed: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl ExecutionError {
    /// Whether a new attempt of the same quantum could succeed.
    ///
    /// Nothing is retried inside the context; this only informs the driver.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageWrite { .. })
    }

    pub(crate) fn from_storage(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(d) => Self::DatasetNotFound(d),
            StorageError::AlreadyExists(d) => Self::StorageWrite {
                dataset: d,
                reason: "dataset already exists".to_string(),
            },
            StorageError::WriteFailed { dataset, reason } => Self::StorageWrite { dataset, reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_execution_errors() {
        let e = ExecutionError::from_storage(StorageError::NotFound("raw@{}".into()));
        assert!(matches!(e, ExecutionError::DatasetNotFound(_)));
        assert!(!e.is_retryable());

        let e = ExecutionError::from_storage(StorageError::WriteFailed {
            dataset: "calexp@{}".into(),
            reason: "disk full".into(),
        });
        assert!(e.is_retryable());
        assert_eq!(e.to_string(), "storage write failed for calexp@{}: disk full");
    }
}
