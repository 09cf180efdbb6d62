//! Quanta Core - quantum graph construction
//!
//! The data model shared by every other crate in the workspace:
//! - Dimension universe, data coordinates and sky regions
//! - Dataset types and immutable dataset references
//! - Task connections (builder, then frozen) and task definitions
//! - Quanta and the immutable [`QuantumGraph`]
//! - [`GraphBuilder`], which resolves inputs and spatially constrained
//!   prerequisites against a dataset catalog
//! - [`QuantumSuccessCaveats`], the qualified-success flag set
//!
//! # Example
//!
//! ```rust,ignore
//! use quanta_core::prelude::*;
//!
//! let universe = Arc::new(DimensionUniverse::builder()
//!     .dimension("instrument", &[])
//!     .dimension("visit", &["instrument"])
//!     .build()?);
//! let graph = GraphBuilder::new(universe).build(task_defs, &catalog)?;
//! println!("{} quanta", graph.len());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod builder;
pub mod caveats;
pub mod config;
pub mod connections;
pub mod coordinate;
pub mod dataset;
pub mod dimensions;
pub mod error;
pub mod graph;
pub mod quantum;
pub mod region;

pub use builder::{DatasetQuery, GraphBuilder, PACKAGES_DATASET};
pub use caveats::QuantumSuccessCaveats;
pub use config::BuildConfig;
pub use connections::{
    Connection, ConnectionKind, Multiplicity, TaskConnections, TaskConnectionsBuilder, TaskDef,
};
pub use coordinate::{DataCoordinate, DimensionValue};
pub use dataset::{DatasetId, DatasetRef, DatasetType, DatasetVersion};
pub use dimensions::{DimensionUniverse, DimensionUniverseBuilder, SpatialKind};
pub use error::{ConfigError, ConnectionError, DimensionError, GraphConstructionError};
pub use graph::{GlobalInitOutputs, QuantumGraph, QuantumIterData};
pub use quantum::{Quantum, QuantumId};
pub use region::{Pixelization, Region};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building quantum graphs
    pub use crate::{
        BuildConfig, Connection, DataCoordinate, DatasetQuery, DatasetRef, DatasetType,
        DimensionUniverse, GraphBuilder, Quantum, QuantumGraph, QuantumId, QuantumSuccessCaveats,
        TaskConnections, TaskDef,
    };
    pub use std::sync::Arc;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
