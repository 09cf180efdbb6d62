//! Quanta Provenance - reconciling repeated executions of a quantum graph
//!
//! - [`QuantumProvenanceGraph`]: per-quantum attempt ledger with derived
//!   `BLOCKED` status and root-cause attribution
//! - [`IngestLog`]: hash-chained record of every state-changing ingestion
//! - [`Summary`]: version 1 / version 2 reports, aggregation across graphs
//!
//! # Example
//!
//! ```rust,ignore
//! use quanta_provenance::prelude::*;
//!
//! let pg = QuantumProvenanceGraph::new(&graph);
//! pg.ingest_reports(1, &executor.execute_graph(&graph, ExecutionMode::Batch)?)?;
//! println!("{}", pg.report(true).to_table());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod log;
pub mod logging;
pub mod report;
pub mod status;

pub use config::{LogFormat, LoggingConfig, ReportConfig};
pub use error::{ConfigError, ProvenanceError};
pub use graph::{
    AttemptRecord, AttemptState, IngestResult, ProvenanceSnapshot, QuantumHistory, QuantumProvenanceGraph,
    QuantumSnapshot, QuantumState,
};
pub use log::{IngestEntry, IngestLog};
pub use report::{AttemptSummary, DatasetTypeSummary, QuantumSummary, Summary, TaskSummary};
pub use status::{allowed_transitions, validate_transition, AttemptOutcome, QuantumStatus};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for provenance tracking
    pub use crate::{
        AttemptOutcome, IngestResult, ProvenanceError, QuantumProvenanceGraph, QuantumStatus, ReportConfig,
        Summary,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
