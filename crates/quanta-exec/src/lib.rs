//! Quanta Exec - mediated dataset access during quantum execution
//!
//! - [`ExecutionContext`]: the only path between a task and storage; built
//!   from either a full or a limited client, never anything else
//! - [`ProvenanceAccumulator`]: per-attempt record of consumed versions and
//!   free-form annotations, attached to every written dataset
//! - [`TaskFactory`] / [`TaskRegistry`]: task construction against the
//!   limited client only
//! - [`QuantumExecutor`]: reference driver writing caveats to the task
//!   metadata slot
//!
//! # Example
//!
//! ```rust,ignore
//! use quanta_exec::prelude::*;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let executor = QuantumExecutor::new(store, Arc::new(registry));
//! for report in executor.execute_graph(&graph, ExecutionMode::Batch)? {
//!     println!("{} {:?}", report.task, report.status);
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod context;
pub mod error;
pub mod executor;
pub mod metadata;
pub mod provenance;
pub mod storage;
pub mod task;

pub use context::{Capability, ExecutionContext, QuantumProvenance};
pub use error::{ExecutionError, StorageError};
pub use executor::{output_caveats, ExecutionMode, ExecutionStatus, QuantumExecutionReport, QuantumExecutor};
pub use metadata::{TaskMetadata, CAVEATS_KEY};
pub use provenance::{DatasetProvenance, InputProvenance, ProvenanceAccumulator};
pub use storage::{FullStorage, InMemoryStore, LimitedStorage, StoredDataset};
pub use task::{PipelineTask, TaskFactory, TaskOutcome, TaskRegistry};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running quanta
    pub use crate::{
        Capability, ExecutionContext, ExecutionError, ExecutionMode, ExecutionStatus, FullStorage,
        InMemoryStore, LimitedStorage, PipelineTask, QuantumExecutor, TaskFactory, TaskMetadata,
        TaskOutcome, TaskRegistry,
    };
    pub use std::sync::Arc;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
