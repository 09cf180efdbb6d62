//! Structured summaries of a provenance graph
//!
//! Version 1 folds caveated successes into `n_successful`. Version 2 keeps
//! `n_successful` for plain successes and breaks caveated ones out, with a
//! count per caveat flag.

use crate::graph::{QuantumProvenanceGraph, QuantumState};
use crate::status::QuantumStatus;
use quanta_core::{QuantumId, QuantumSuccessCaveats};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub attempt: u32,
    pub status: QuantumStatus,
    #[serde(default)]
    pub caveats: QuantumSuccessCaveats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumSummary {
    pub id: QuantumId,
    pub task: String,
    pub coordinate: String,
    pub status: QuantumStatus,
    #[serde(default)]
    pub caveats: QuantumSuccessCaveats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<QuantumId>,
    #[serde(default)]
    pub wonky: bool,
    pub attempts: Vec<AttemptSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub n_expected: usize,
    pub n_successful: usize,
    /// Always zero in version 1 reports
    #[serde(default)]
    pub n_succeeded_with_caveats: usize,
    /// Per caveat flag name; empty in version 1 reports
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub caveats: BTreeMap<String, usize>,
    pub n_failed: usize,
    pub n_blocked: usize,
    pub n_not_run: usize,
    pub n_running: usize,
    pub n_wonky: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_quanta: Vec<QuantumId>,
}

impl TaskSummary {
    fn add_quantum(&mut self, summary: &QuantumSummary, v2: bool) {
        self.n_expected += 1;
        match summary.status {
            QuantumStatus::Succeeded => self.n_successful += 1,
            QuantumStatus::SucceededWithCaveats if v2 => {
                self.n_succeeded_with_caveats += 1;
                for name in summary.caveats.iter_names() {
                    *self.caveats.entry(name.to_string()).or_default() += 1;
                }
            }
            QuantumStatus::SucceededWithCaveats => self.n_successful += 1,
            QuantumStatus::Failed => {
                self.n_failed += 1;
                self.failed_quanta.push(summary.id);
            }
            QuantumStatus::Blocked => self.n_blocked += 1,
            QuantumStatus::NotRun => self.n_not_run += 1,
            QuantumStatus::Running => self.n_running += 1,
        }
        if summary.wonky {
            self.n_wonky += 1;
        }
    }

    fn merge(&mut self, other: &TaskSummary, v2: bool) {
        self.n_expected += other.n_expected;
        self.n_successful += other.n_successful;
        if v2 {
            self.n_succeeded_with_caveats += other.n_succeeded_with_caveats;
            for (name, n) in &other.caveats {
                *self.caveats.entry(name.clone()).or_default() += n;
            }
        } else {
            self.n_successful += other.n_succeeded_with_caveats;
        }
        self.n_failed += other.n_failed;
        self.n_blocked += other.n_blocked;
        self.n_not_run += other.n_not_run;
        self.n_running += other.n_running;
        self.n_wonky += other.n_wonky;
        self.failed_quanta.extend(other.failed_quanta.iter().copied());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetTypeSummary {
    pub n_expected: usize,
    pub n_produced: usize,
    pub n_missing: usize,
}

impl DatasetTypeSummary {
    fn merge(&mut self, other: &DatasetTypeSummary) {
        self.n_expected += other.n_expected;
        self.n_produced += other.n_produced;
        self.n_missing += other.n_missing;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Whether caveated successes are broken out
    pub v2: bool,
    pub tasks: BTreeMap<String, TaskSummary>,
    pub datasets: BTreeMap<String, DatasetTypeSummary>,
    pub quanta: Vec<QuantumSummary>,
}

fn quantum_summary(id: QuantumId, task: &str, coordinate: &str, state: &QuantumState) -> QuantumSummary {
    QuantumSummary {
        id,
        task: task.to_string(),
        coordinate: coordinate.to_string(),
        status: state.status(),
        caveats: state.caveats(),
        blocked_by: state.blocked_by().into_iter().collect(),
        wonky: state.is_wonky(),
        attempts: state
            .attempts
            .iter()
            .map(|a| AttemptSummary {
                attempt: a.attempt,
                status: a.status,
                caveats: a.caveats,
                error: a.error.clone(),
            })
            .collect(),
    }
}

impl QuantumProvenanceGraph {
    /// Summarize every quantum, task and dataset type.
    #[must_use]
    pub fn report(&self, force_v2: bool) -> Summary {
        let mut summary = Summary {
            v2: force_v2,
            ..Summary::default()
        };
        let states = self.project(self.order.iter().copied());
        for id in &self.order {
            let (Some(node), Some(state)) = (self.nodes.get(id), states.get(id)) else {
                continue;
            };
            let q = {
                let history = node.history.lock();
                let written: BTreeSet<_> = history.outputs_written();
                for output in &node.outputs {
                    let entry = summary.datasets.entry(output.dataset_type.clone()).or_default();
                    entry.n_expected += 1;
                    if written.contains(output) {
                        entry.n_produced += 1;
                    } else {
                        entry.n_missing += 1;
                    }
                }
                quantum_summary(*id, &node.task, &node.coordinate, state)
            };

            summary
                .tasks
                .entry(q.task.clone())
                .or_default()
                .add_quantum(&q, force_v2);
            summary.quanta.push(q);
        }
        tracing::debug!(quanta = summary.quanta.len(), v2 = force_v2, "report built");
        summary
    }
}

impl Summary {
    /// Merge summaries of several graphs. The result is version 2 only when
    /// every input is.
    #[must_use]
    pub fn aggregate(summaries: &[Summary]) -> Summary {
        let v2 = !summaries.is_empty() && summaries.iter().all(|s| s.v2);
        let mut out = Summary {
            v2,
            ..Summary::default()
        };
        for s in summaries {
            for (task, t) in &s.tasks {
                out.tasks.entry(task.clone()).or_default().merge(t, v2);
            }
            for (name, d) in &s.datasets {
                out.datasets.entry(name.clone()).or_default().merge(d);
            }
            out.quanta.extend(s.quanta.iter().cloned());
        }
        out
    }

    /// Quanta currently in `status`.
    pub fn quanta_with_status(&self, status: QuantumStatus) -> impl Iterator<Item = &QuantumSummary> {
        self.quanta.iter().filter(move |q| q.status == status)
    }

    /// Plain-text tables for terminal output.
    #[must_use]
    pub fn to_table(&self) -> String {
        let width = self
            .tasks
            .keys()
            .chain(self.datasets.keys())
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(12);

        let mut out = String::new();
        let _ = write!(out, "{:<width$} {:>8} {:>9}", "Task", "Expected", "Succeeded");
        if self.v2 {
            let _ = write!(out, " {:>8} {:<12}", "Caveated", "Caveats");
        }
        let _ = writeln!(out, " {:>6} {:>7} {:>7} {:>7} {:>5}", "Failed", "Blocked", "NotRun", "Running", "Wonky");
        for (task, t) in &self.tasks {
            let _ = write!(out, "{task:<width$} {:>8} {:>9}", t.n_expected, t.n_successful);
            if self.v2 {
                let codes: Vec<String> = t
                    .caveats
                    .iter()
                    .filter_map(|(name, n)| {
                        QuantumSuccessCaveats::from_name(name).map(|flag| format!("{}({n})", flag.concise()))
                    })
                    .collect();
                let _ = write!(out, " {:>8} {:<12}", t.n_succeeded_with_caveats, codes.join(" "));
            }
            let _ = writeln!(
                out,
                " {:>6} {:>7} {:>7} {:>7} {:>5}",
                t.n_failed, t.n_blocked, t.n_not_run, t.n_running, t.n_wonky
            );
        }

        if !self.datasets.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{:<width$} {:>8} {:>8} {:>7}", "Dataset type", "Expected", "Produced", "Missing");
            for (name, d) in &self.datasets {
                let _ = writeln!(out, "{name:<width$} {:>8} {:>8} {:>7}", d.n_expected, d.n_produced, d.n_missing);
            }
        }

        if self.v2 {
            let _ = writeln!(out);
            for (code, description) in QuantumSuccessCaveats::legend() {
                let _ = writeln!(out, "{code}: {description}");
            }
        }
        out
    }
}
