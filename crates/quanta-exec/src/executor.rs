//! Reference single-process driver
//!
//! Runs quanta through the factory and an execution context, derives the
//! output-related caveats, and writes each quantum's metadata output. The
//! driver never schedules in parallel; callers that want concurrency run
//! independent quanta on their own threads.

use crate::context::ExecutionContext;
use crate::error::{ExecutionError, StorageError};
use crate::metadata::TaskMetadata;
use crate::provenance::DatasetProvenance;
use crate::storage::{FullStorage, LimitedStorage};
use crate::task::TaskFactory;
use chrono::{DateTime, Utc};
use quanta_core::{DatasetRef, QuantumGraph, QuantumId, QuantumSuccessCaveats};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// How the context for each quantum is built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Full client; debug runs
    Direct,
    /// Limited client; production batch runs
    #[default]
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    /// Not run because an upstream quantum did not succeed in this pass
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuantumExecutionReport {
    pub quantum: QuantumId,
    pub task: String,
    pub status: ExecutionStatus,
    pub caveats: QuantumSuccessCaveats,
    pub provenance: DatasetProvenance,
    pub outputs_written: Vec<DatasetRef>,
    pub metadata: Option<TaskMetadata>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl QuantumExecutionReport {
    fn skipped(quantum: QuantumId, task: &str) -> Self {
        let now = Utc::now();
        Self {
            quantum,
            task: task.to_string(),
            status: ExecutionStatus::Skipped,
            caveats: QuantumSuccessCaveats::NONE,
            provenance: DatasetProvenance::default(),
            outputs_written: Vec::new(),
            metadata: None,
            error: None,
            started_at: now,
            finished_at: now,
        }
    }

    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }
}

/// Caveats implied by which declared outputs were actually written.
#[must_use]
pub fn output_caveats(expected: &[DatasetRef], written: &[DatasetRef]) -> QuantumSuccessCaveats {
    if expected.is_empty() {
        return QuantumSuccessCaveats::NONE;
    }
    let missing = expected.iter().filter(|r| !written.contains(r)).count();
    if missing == expected.len() {
        QuantumSuccessCaveats::ANY_OUTPUTS_MISSING | QuantumSuccessCaveats::ALL_OUTPUTS_MISSING
    } else if missing > 0 {
        QuantumSuccessCaveats::ANY_OUTPUTS_MISSING
    } else {
        QuantumSuccessCaveats::NONE
    }
}

pub struct QuantumExecutor<S: FullStorage + 'static> {
    store: Arc<S>,
    factory: Arc<dyn TaskFactory>,
}

impl<S: FullStorage + 'static> std::fmt::Debug for QuantumExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantumExecutor").finish_non_exhaustive()
    }
}

impl<S: FullStorage + 'static> QuantumExecutor<S> {
    #[must_use]
    pub fn new(store: Arc<S>, factory: Arc<dyn TaskFactory>) -> Self {
        Self { store, factory }
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn limited(&self) -> Arc<dyn LimitedStorage> {
        self.store.clone()
    }

    /// Write the graph-global datasets: each task's config, its declared
    /// init outputs and the packages dataset. Datasets already present are
    /// left alone so a retried run can call this again.
    ///
    /// # Errors
    /// [`ExecutionError::TaskConstruction`] if a task cannot be built or
    /// does not provide a declared init output; [`ExecutionError::StorageWrite`]
    /// on backend failure.
    pub fn write_init_outputs(&self, graph: &QuantumGraph) -> Result<Vec<DatasetRef>, ExecutionError> {
        let mut written = Vec::new();
        for def in graph.task_defs() {
            let task = self.factory.make_task(def, self.limited())?;
            let values = task.init_output_values();
            for dataset in graph.global_init_output_refs(&def.label) {
                let value = if dataset.dataset_type == def.config_dataset_type().name {
                    def.config.clone()
                } else {
                    values
                        .iter()
                        .find(|(name, _)| *name == dataset.dataset_type)
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| ExecutionError::TaskConstruction {
                            task: def.label.clone(),
                            reason: format!("no value for init output {}", dataset.dataset_type),
                        })?
                };
                if let Some(stored) = self.write_global(dataset, value)? {
                    written.push(stored);
                }
            }
        }
        if let Some(packages) = graph.packages_ref() {
            let value = serde_json::json!({
                "quanta-core": quanta_core::VERSION,
                "quanta-exec": crate::VERSION,
            });
            if let Some(stored) = self.write_global(packages, value)? {
                written.push(stored);
            }
        }
        tracing::info!(count = written.len(), "init outputs written");
        Ok(written)
    }

    fn write_global(&self, dataset: &DatasetRef, value: Value) -> Result<Option<DatasetRef>, ExecutionError> {
        match self.store.put(dataset, value, &DatasetProvenance::default()) {
            Ok(stored) => Ok(Some(stored)),
            Err(StorageError::AlreadyExists(_)) => {
                tracing::debug!(dataset = %dataset, "init output already present");
                Ok(None)
            }
            Err(e) => Err(ExecutionError::from_storage(e)),
        }
    }

    /// Run one quantum.
    ///
    /// Task failures are reported through the returned report, not as
    /// errors.
    ///
    /// # Errors
    /// [`ExecutionError::UnknownQuantum`] or
    /// [`ExecutionError::TaskConstruction`]; nothing has run in either case.
    pub fn execute(
        &self,
        graph: &QuantumGraph,
        id: QuantumId,
        mode: ExecutionMode,
    ) -> Result<QuantumExecutionReport, ExecutionError> {
        let quantum = graph.get(id).ok_or(ExecutionError::UnknownQuantum(id))?;
        let def = graph
            .task_def(&quantum.task)
            .ok_or_else(|| ExecutionError::TaskConstruction {
                task: quantum.task.clone(),
                reason: "task is not part of the graph".to_string(),
            })?;
        let task = self.factory.make_task(def, self.limited())?;

        let universe = graph.dimensions().clone();
        let mut ctx = match mode {
            ExecutionMode::Direct => ExecutionContext::from_full(self.store.clone(), quantum, universe),
            ExecutionMode::Batch => ExecutionContext::from_limited(self.limited(), quantum, universe),
        };

        let started_at = Utc::now();
        let span = tracing::info_span!("quantum", task = %def.label, quantum = %quantum);
        let _guard = span.enter();
        let result = task.run_quantum(&mut ctx, quantum);

        let metadata_type = def.metadata_dataset_type().name;
        let metadata_ref = quantum
            .outputs
            .iter()
            .find(|r| r.dataset_type == metadata_type)
            .cloned();

        let (status, caveats, metadata, error) = match result {
            Ok(outcome) => {
                let expected: Vec<DatasetRef> = quantum
                    .outputs
                    .iter()
                    .filter(|r| r.dataset_type != metadata_type)
                    .cloned()
                    .collect();
                let caveats = outcome.caveats | output_caveats(&expected, ctx.outputs_written());

                let mut metadata = TaskMetadata::new();
                metadata.set_caveats(caveats);
                metadata.insert("started_at", Value::from(started_at.to_rfc3339()));
                metadata.insert("outputs_written", Value::from(ctx.outputs_written().len()));

                let written = match &metadata_ref {
                    Some(dataset) => metadata
                        .to_value()
                        .map_err(ExecutionError::from)
                        .and_then(|value| ctx.put(dataset, value).map(|_| ())),
                    None => Ok(()),
                };
                match written {
                    Ok(()) => (ExecutionStatus::Succeeded, caveats, Some(metadata), None),
                    Err(e) => (ExecutionStatus::Failed, QuantumSuccessCaveats::NONE, None, Some(e.to_string())),
                }
            }
            Err(e) => (ExecutionStatus::Failed, QuantumSuccessCaveats::NONE, None, Some(format!("{e:#}"))),
        };

        match (&status, &error) {
            (ExecutionStatus::Failed, Some(e)) => tracing::error!(error = %e, "quantum failed"),
            _ if caveats.is_empty() => tracing::info!("quantum succeeded"),
            _ => tracing::info!(caveats = %caveats, "quantum succeeded with caveats"),
        }

        let done = ctx.finish();
        Ok(QuantumExecutionReport {
            quantum: id,
            task: def.label.clone(),
            status,
            caveats,
            provenance: done.provenance,
            outputs_written: done.outputs_written,
            metadata,
            error,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Write init outputs, then run every quantum in dependency order. A
    /// quantum whose upstream failed or was skipped is skipped.
    ///
    /// # Errors
    /// Anything [`write_init_outputs`](Self::write_init_outputs) or
    /// [`execute`](Self::execute) returns as an error.
    pub fn execute_graph(&self, graph: &QuantumGraph, mode: ExecutionMode) -> Result<Vec<QuantumExecutionReport>, ExecutionError> {
        self.write_init_outputs(graph)?;

        let mut reports: Vec<QuantumExecutionReport> = Vec::with_capacity(graph.len());
        for step in graph.traverse() {
            let blocked = step
                .dependencies
                .iter()
                .any(|&i| reports.get(i).is_some_and(|r| !r.succeeded()));
            let report = if blocked {
                tracing::warn!(quantum = %step.quantum, "upstream did not succeed, skipping");
                QuantumExecutionReport::skipped(step.quantum.id, &step.task.label)
            } else {
                self.execute(graph, step.quantum.id, mode)?
            };
            reports.push(report);
        }

        let failed = reports.iter().filter(|r| r.status == ExecutionStatus::Failed).count();
        tracing::info!(quanta = reports.len(), failed, "graph execution finished");
        Ok(reports)
    }
}
