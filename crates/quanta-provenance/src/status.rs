//! Quantum status and per-attempt outcomes
//!
//! Within one attempt a quantum moves `NotRun → Running → terminal`, or
//! straight to a terminal state when only the result is reported. `Blocked`
//! is never reported by a driver; the provenance graph derives it.

use crate::error::ProvenanceError;
use quanta_core::{DatasetRef, QuantumSuccessCaveats};
use quanta_exec::{ExecutionStatus, QuantumExecutionReport, TaskMetadata};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuantumStatus {
    NotRun,
    Running,
    Succeeded,
    SucceededWithCaveats,
    Failed,
    Blocked,
}

impl QuantumStatus {
    pub const ALL: [QuantumStatus; 6] = [
        Self::NotRun,
        Self::Running,
        Self::Succeeded,
        Self::SucceededWithCaveats,
        Self::Failed,
        Self::Blocked,
    ];

    #[inline]
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded | Self::SucceededWithCaveats)
    }

    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::SucceededWithCaveats | Self::Failed | Self::Blocked
        )
    }

    /// Whether a quantum in this state blocks its dependents.
    #[inline]
    #[must_use]
    pub fn blocks_downstream(self) -> bool {
        matches!(self, Self::Failed | Self::Blocked)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotRun => "NOT_RUN",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::SucceededWithCaveats => "SUCCEEDED_WITH_CAVEATS",
            Self::Failed => "FAILED",
            Self::Blocked => "BLOCKED",
        }
    }
}

impl Display for QuantumStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a status change within one attempt.
///
/// # Errors
/// [`ProvenanceError::IllegalTransition`] if `to` is not reachable from `from`.
pub fn validate_transition(from: QuantumStatus, to: QuantumStatus) -> Result<(), ProvenanceError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(ProvenanceError::IllegalTransition { from, to })
    }
}

#[must_use]
pub fn allowed_transitions(from: QuantumStatus) -> Vec<QuantumStatus> {
    use QuantumStatus::*;
    match from {
        NotRun => vec![Running, Succeeded, SucceededWithCaveats, Failed, Blocked],
        Running => vec![Succeeded, SucceededWithCaveats, Failed],
        Succeeded | SucceededWithCaveats | Failed | Blocked => vec![],
    }
}

/// What a driver reports for one attempt of one quantum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub status: QuantumStatus,
    #[serde(default)]
    pub caveats: QuantumSuccessCaveats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs_written: Vec<DatasetRef>,
}

impl AttemptOutcome {
    fn new(status: QuantumStatus) -> Self {
        Self {
            status,
            caveats: QuantumSuccessCaveats::NONE,
            error: None,
            outputs_written: Vec::new(),
        }
    }

    #[must_use]
    pub fn running() -> Self {
        Self::new(QuantumStatus::Running)
    }

    #[must_use]
    pub fn succeeded() -> Self {
        Self::new(QuantumStatus::Succeeded)
    }

    /// Success qualified by `caveats`; plain success when `caveats` is empty.
    #[must_use]
    pub fn succeeded_with(caveats: QuantumSuccessCaveats) -> Self {
        Self {
            caveats,
            ..Self::new(QuantumStatus::Succeeded)
        }
        .normalized_status()
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(QuantumStatus::Failed)
        }
    }

    #[must_use]
    pub fn with_outputs(mut self, outputs: Vec<DatasetRef>) -> Self {
        self.outputs_written = outputs;
        self
    }

    /// Success outcome read from the task metadata slot.
    #[must_use]
    pub fn from_metadata(metadata: &TaskMetadata) -> Self {
        Self::succeeded_with(metadata.caveats())
    }

    /// Outcome of a reference-driver run. A skipped quantum is reported as
    /// failed; the graph turns it into `Blocked` when its upstream failed.
    #[must_use]
    pub fn from_report(report: &QuantumExecutionReport) -> Self {
        let outcome = match report.status {
            ExecutionStatus::Succeeded => Self::succeeded_with(report.caveats),
            ExecutionStatus::Failed => Self::failed(report.error.clone().unwrap_or_default()),
            ExecutionStatus::Skipped => Self::failed("skipped: upstream did not succeed"),
        };
        outcome.with_outputs(report.outputs_written.clone())
    }

    fn normalized_status(mut self) -> Self {
        if self.status == QuantumStatus::Succeeded && !self.caveats.is_empty() {
            self.status = QuantumStatus::SucceededWithCaveats;
        }
        self
    }

    /// Canonical form: caveated success is `SucceededWithCaveats`, and
    /// caveats only accompany successes.
    ///
    /// # Errors
    /// [`ProvenanceError::InvalidOutcome`] for a reported `NotRun` or
    /// `Blocked`, or `SucceededWithCaveats` without caveats.
    pub fn normalize(self) -> Result<Self, ProvenanceError> {
        let mut outcome = self.normalized_status();
        match outcome.status {
            QuantumStatus::NotRun | QuantumStatus::Blocked => Err(ProvenanceError::InvalidOutcome(format!(
                "{} cannot be reported by a driver",
                outcome.status
            ))),
            QuantumStatus::SucceededWithCaveats if outcome.caveats.is_empty() => Err(
                ProvenanceError::InvalidOutcome("caveated success without caveats".to_string()),
            ),
            QuantumStatus::Running | QuantumStatus::Failed => {
                outcome.caveats = QuantumSuccessCaveats::NONE;
                Ok(outcome)
            }
            _ => Ok(outcome),
        }
    }

    /// Whether two outcomes describe the same result for idempotency.
    #[must_use]
    pub fn same_result(&self, other: &AttemptOutcome) -> bool {
        self.status == other.status && self.caveats == other.caveats
    }
}
