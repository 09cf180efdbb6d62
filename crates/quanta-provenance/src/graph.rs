//! Quantum provenance graph
//!
//! Long-lived ledger of attempt outcomes for the quanta of one
//! [`QuantumGraph`]. Attempts are keyed by (quantum, attempt number) and
//! never overwritten. Only reported outcomes are stored; effective status
//! is a projection recomputed from them on every read.
//!
//! # Blocking
//!
//! Attempt `N` of a quantum is `Blocked` when some direct upstream quantum,
//! as of its own attempts numbered `N` or lower, is `Failed` or `Blocked`.
//! Attribution always names the root-cause failed quanta, so a quantum
//! blocked by a blocked quantum points past it. Because the projection is
//! recomputed, the order in which attempts arrive does not matter.
//!
//! An attempt whose upstream has not yet reached a terminal state for that
//! attempt is still recorded, as [`IngestResult::Provisional`]; its blocking
//! is settled once the upstream outcome arrives.
//!
//! # Concurrency
//!
//! The quantum set is fixed at construction. Each quantum's history sits
//! behind its own mutex: ingestion for independent quanta runs in parallel
//! and ingestion for one quantum is serialized, including its log entry.
//! Projection takes one quantum lock at a time.

use crate::error::ProvenanceError;
use crate::log::{IngestEntry, IngestLog};
use crate::status::{validate_transition, AttemptOutcome, QuantumStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use quanta_core::{DatasetRef, QuantumGraph, QuantumId, QuantumSuccessCaveats};
use quanta_exec::{QuantumExecutionReport, TaskMetadata};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// One ingested attempt, as reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub ingested_at: DateTime<Utc>,
}

/// Reported attempts of one quantum
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumHistory {
    pub attempts: BTreeMap<u32, AttemptRecord>,
}

impl QuantumHistory {
    fn latest_attempt(&self) -> Option<u32> {
        self.attempts.keys().next_back().copied()
    }

    /// Every output written by any attempt.
    #[must_use]
    pub fn outputs_written(&self) -> BTreeSet<&DatasetRef> {
        self.attempts
            .values()
            .flat_map(|r| r.outcome.outputs_written.iter())
            .collect()
    }
}

/// Effective status of one attempt once blocking is applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptState {
    pub attempt: u32,
    pub status: QuantumStatus,
    #[serde(default)]
    pub caveats: QuantumSuccessCaveats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub blocked_by: BTreeSet<QuantumId>,
}

impl AttemptState {
    #[inline]
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.status == QuantumStatus::Blocked
    }
}

/// Projected view of one quantum, attempts in ascending order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuantumState {
    pub attempts: Vec<AttemptState>,
}

/// Status, caveats and attribution of a run of attempts.
fn effective(covered: &[AttemptState]) -> (QuantumStatus, QuantumSuccessCaveats, BTreeSet<QuantumId>) {
    match covered.iter().rev().find(|a| !a.is_blocked()) {
        Some(a) => (a.status, a.caveats, BTreeSet::new()),
        None => match covered.last() {
            Some(last) => (QuantumStatus::Blocked, QuantumSuccessCaveats::NONE, last.blocked_by.clone()),
            None => (QuantumStatus::NotRun, QuantumSuccessCaveats::NONE, BTreeSet::new()),
        },
    }
}

impl QuantumState {
    fn covered(&self, attempt: u32) -> &[AttemptState] {
        let n = self.attempts.partition_point(|a| a.attempt <= attempt);
        &self.attempts[..n]
    }

    /// Outcome of the most recent non-blocked attempt; `Blocked` when every
    /// attempt was blocked; `NotRun` with no attempts.
    #[must_use]
    pub fn status(&self) -> QuantumStatus {
        effective(&self.attempts).0
    }

    #[must_use]
    pub fn caveats(&self) -> QuantumSuccessCaveats {
        effective(&self.attempts).1
    }

    /// Current attribution when blocked, empty otherwise.
    #[must_use]
    pub fn blocked_by(&self) -> BTreeSet<QuantumId> {
        effective(&self.attempts).2
    }

    /// Status considering only attempts numbered `attempt` or lower.
    #[must_use]
    pub fn status_as_of(&self, attempt: u32) -> QuantumStatus {
        effective(self.covered(attempt)).0
    }

    /// Root causes `id` imposes on a dependent's `attempt`; empty when it
    /// does not block it.
    fn blame_as_of(&self, id: QuantumId, attempt: u32) -> BTreeSet<QuantumId> {
        match effective(self.covered(attempt)) {
            (QuantumStatus::Failed, ..) => BTreeSet::from([id]),
            (QuantumStatus::Blocked, _, causes) => causes,
            _ => BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn attempt(&self, attempt: u32) -> Option<&AttemptState> {
        self.attempts.iter().find(|a| a.attempt == attempt)
    }

    /// Succeeded in some attempt and failed in a later one.
    #[must_use]
    pub fn is_wonky(&self) -> bool {
        let mut succeeded = false;
        for a in self.attempts.iter().filter(|a| !a.is_blocked()) {
            if a.status.is_success() {
                succeeded = true;
            } else if succeeded && a.status == QuantumStatus::Failed {
                return true;
            }
        }
        false
    }
}

/// What an `ingest` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestResult {
    /// New or updated record with this effective status
    Recorded(QuantumStatus),
    /// Recorded, but some upstream quantum has not reached a terminal state
    /// for this attempt; blocking is re-derived when it does
    Provisional(QuantumStatus),
    /// Same outcome already recorded
    Unchanged,
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) task: String,
    pub(crate) coordinate: String,
    pub(crate) upstream: Vec<QuantumId>,
    pub(crate) outputs: Vec<DatasetRef>,
    pub(crate) history: Mutex<QuantumHistory>,
}

/// Serializable state of a provenance graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceSnapshot {
    /// Upstream before downstream
    pub quanta: Vec<QuantumSnapshot>,
    #[serde(default)]
    pub log: Vec<IngestEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantumSnapshot {
    pub id: QuantumId,
    pub task: String,
    pub coordinate: String,
    #[serde(default)]
    pub upstream: Vec<QuantumId>,
    #[serde(default)]
    pub outputs: Vec<DatasetRef>,
    #[serde(default)]
    pub history: QuantumHistory,
}

#[derive(Debug)]
pub struct QuantumProvenanceGraph {
    /// Topological order
    pub(crate) order: Vec<QuantumId>,
    pub(crate) nodes: HashMap<QuantumId, Node>,
    log: IngestLog,
}

impl QuantumProvenanceGraph {
    /// Every quantum starts `NotRun`.
    #[must_use]
    pub fn new(graph: &QuantumGraph) -> Self {
        let mut order = Vec::with_capacity(graph.len());
        let mut nodes = HashMap::with_capacity(graph.len());
        for q in graph.quanta() {
            order.push(q.id);
            nodes.insert(
                q.id,
                Node {
                    task: q.task.clone(),
                    coordinate: q.coordinate.to_string(),
                    upstream: graph.dependencies(q.id),
                    outputs: q.outputs.clone(),
                    history: Mutex::new(QuantumHistory::default()),
                },
            );
        }
        tracing::debug!(quanta = order.len(), "provenance graph created");
        Self {
            order,
            nodes,
            log: IngestLog::new(),
        }
    }

    /// Restore a graph from a snapshot, verifying the ingestion log and
    /// that every history agrees with it.
    ///
    /// # Errors
    /// - [`ProvenanceError::InvalidSnapshot`] for duplicate, dangling or
    ///   misordered quantum ids, or histories the log does not account for
    /// - [`ProvenanceError::IntegrityViolation`] for a broken log
    pub fn from_snapshot(snapshot: ProvenanceSnapshot) -> Result<Self, ProvenanceError> {
        let ids: BTreeSet<QuantumId> = snapshot.quanta.iter().map(|q| q.id).collect();
        if ids.len() != snapshot.quanta.len() {
            return Err(ProvenanceError::InvalidSnapshot("duplicate quantum id".to_string()));
        }
        let mut seen = HashSet::with_capacity(ids.len());
        for q in &snapshot.quanta {
            if let Some(missing) = q.upstream.iter().find(|u| !ids.contains(u)) {
                return Err(ProvenanceError::InvalidSnapshot(format!(
                    "quantum {} depends on unknown quantum {missing}",
                    q.id
                )));
            }
            if let Some(later) = q.upstream.iter().find(|u| !seen.contains(*u)) {
                return Err(ProvenanceError::InvalidSnapshot(format!(
                    "quantum {} is listed before its upstream {later}",
                    q.id
                )));
            }
            seen.insert(q.id);
        }

        let log = IngestLog::from_entries(snapshot.log)?;
        check_histories_against_log(&snapshot.quanta, &log.entries())?;

        let mut order = Vec::with_capacity(snapshot.quanta.len());
        let mut nodes = HashMap::with_capacity(snapshot.quanta.len());
        for q in snapshot.quanta {
            order.push(q.id);
            nodes.insert(
                q.id,
                Node {
                    task: q.task,
                    coordinate: q.coordinate,
                    upstream: q.upstream,
                    outputs: q.outputs,
                    history: Mutex::new(q.history),
                },
            );
        }
        Ok(Self { order, nodes, log })
    }

    #[must_use]
    pub fn snapshot(&self) -> ProvenanceSnapshot {
        let quanta = self
            .order
            .iter()
            .filter_map(|id| {
                let node = self.nodes.get(id)?;
                Some(QuantumSnapshot {
                    id: *id,
                    task: node.task.clone(),
                    coordinate: node.coordinate.clone(),
                    upstream: node.upstream.clone(),
                    outputs: node.outputs.clone(),
                    history: node.history.lock().clone(),
                })
            })
            .collect();
        ProvenanceSnapshot {
            quanta,
            log: self.log.entries(),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Quantum ids, upstream before downstream.
    pub fn quantum_ids(&self) -> impl Iterator<Item = QuantumId> + '_ {
        self.order.iter().copied()
    }

    fn node(&self, id: QuantumId) -> Result<&Node, ProvenanceError> {
        self.nodes.get(&id).ok_or(ProvenanceError::UnknownQuantum(id))
    }

    /// Record the outcome of `attempt` for `quantum`.
    ///
    /// # Errors
    /// - [`ProvenanceError::UnknownQuantum`] for a quantum not in the graph
    /// - [`ProvenanceError::InvalidOutcome`] for a derived or malformed outcome
    /// - [`ProvenanceError::ProvenanceConflict`] for a different outcome of an
    ///   already-recorded attempt; the first record is kept
    /// - [`ProvenanceError::AttemptOutOfOrder`] for a new attempt numbered
    ///   below the latest recorded one
    pub fn ingest(
        &self,
        quantum: QuantumId,
        attempt: u32,
        outcome: AttemptOutcome,
    ) -> Result<IngestResult, ProvenanceError> {
        let node = self.node(quantum)?;
        let outcome = outcome.normalize()?;

        let mut history = node.history.lock();
        if let Some(existing) = history.attempts.get(&attempt) {
            if existing.outcome.same_result(&outcome) {
                return Ok(IngestResult::Unchanged);
            }
            // Running -> terminal is a legal progression of the same attempt
            if existing.outcome.status != QuantumStatus::Running
                || validate_transition(existing.outcome.status, outcome.status).is_err()
            {
                tracing::error!(
                    quantum = %quantum,
                    attempt,
                    recorded = %existing.outcome.status,
                    incoming = %outcome.status,
                    "conflicting attempt outcome"
                );
                return Err(ProvenanceError::ProvenanceConflict {
                    quantum,
                    attempt,
                    recorded: existing.outcome.status,
                    incoming: outcome.status,
                });
            }
        } else if let Some(latest) = history.latest_attempt().filter(|l| *l > attempt) {
            return Err(ProvenanceError::AttemptOutOfOrder {
                quantum,
                attempt,
                latest,
            });
        }
        validate_transition(QuantumStatus::NotRun, outcome.status)?;

        let (status, caveats) = (outcome.status, outcome.caveats);
        history.attempts.insert(
            attempt,
            AttemptRecord {
                attempt,
                outcome,
                ingested_at: Utc::now(),
            },
        );
        // logged under the quantum lock so the log agrees with the history
        self.log.append(quantum, attempt, status, caveats);
        drop(history);

        let states = self.project([quantum]);
        let Some(state) = states.get(&quantum) else {
            return Err(ProvenanceError::UnknownQuantum(quantum));
        };
        let effective = state.attempt(attempt).map_or(status, |a| a.status);
        if effective == QuantumStatus::Failed && state.is_wonky() {
            tracing::warn!(quantum = %quantum, attempt, "earlier success regressed to failure");
        }
        tracing::debug!(quantum = %quantum, attempt, status = %effective, "attempt ingested");

        let pending = effective != QuantumStatus::Blocked
            && node.upstream.iter().any(|up| {
                states
                    .get(up)
                    .map_or(true, |s| !s.status_as_of(attempt).is_terminal())
            });
        if pending {
            tracing::warn!(
                quantum = %quantum,
                attempt,
                "upstream has not finished this attempt; blocking settles when it reports"
            );
            return Ok(IngestResult::Provisional(effective));
        }
        Ok(IngestResult::Recorded(effective))
    }

    /// Project blocking onto `targets` and everything upstream of them.
    ///
    /// Quanta are visited in topological order, so each upstream state is
    /// complete before its dependents read it.
    pub(crate) fn project(&self, targets: impl IntoIterator<Item = QuantumId>) -> HashMap<QuantumId, QuantumState> {
        let mut needed = HashSet::new();
        let mut stack: Vec<QuantumId> = targets.into_iter().collect();
        while let Some(id) = stack.pop() {
            if needed.insert(id) {
                if let Some(node) = self.nodes.get(&id) {
                    stack.extend(node.upstream.iter().copied());
                }
            }
        }

        let mut states: HashMap<QuantumId, QuantumState> = HashMap::with_capacity(needed.len());
        for id in self.order.iter().filter(|id| needed.contains(*id)) {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let reported: Vec<AttemptRecord> = node.history.lock().attempts.values().cloned().collect();
            let attempts = reported
                .into_iter()
                .map(|r| {
                    let blocked_by: BTreeSet<QuantumId> = node
                        .upstream
                        .iter()
                        .filter_map(|up| states.get(up).map(|s| s.blame_as_of(*up, r.attempt)))
                        .flatten()
                        .collect();
                    if blocked_by.is_empty() {
                        AttemptState {
                            attempt: r.attempt,
                            status: r.outcome.status,
                            caveats: r.outcome.caveats,
                            error: r.outcome.error,
                            blocked_by,
                        }
                    } else {
                        AttemptState {
                            attempt: r.attempt,
                            status: QuantumStatus::Blocked,
                            caveats: QuantumSuccessCaveats::NONE,
                            error: r.outcome.error,
                            blocked_by,
                        }
                    }
                })
                .collect();
            states.insert(*id, QuantumState { attempts });
        }
        states
    }

    /// Ingest a successful attempt from the caveats in its metadata slot.
    ///
    /// # Errors
    /// As for [`ingest`](Self::ingest).
    pub fn ingest_metadata(
        &self,
        quantum: QuantumId,
        attempt: u32,
        metadata: &TaskMetadata,
    ) -> Result<IngestResult, ProvenanceError> {
        self.ingest(quantum, attempt, AttemptOutcome::from_metadata(metadata))
    }

    /// Ingest every report of one driver pass as `attempt`, in order.
    ///
    /// # Errors
    /// The first error from [`ingest`](Self::ingest).
    pub fn ingest_reports(&self, attempt: u32, reports: &[QuantumExecutionReport]) -> Result<(), ProvenanceError> {
        for report in reports {
            self.ingest(report.quantum, attempt, AttemptOutcome::from_report(report))?;
        }
        Ok(())
    }

    /// Projected state of one quantum.
    ///
    /// # Errors
    /// [`ProvenanceError::UnknownQuantum`].
    pub fn state(&self, quantum: QuantumId) -> Result<QuantumState, ProvenanceError> {
        self.node(quantum)?;
        self.project([quantum])
            .remove(&quantum)
            .ok_or(ProvenanceError::UnknownQuantum(quantum))
    }

    /// # Errors
    /// [`ProvenanceError::UnknownQuantum`].
    pub fn status(&self, quantum: QuantumId) -> Result<QuantumStatus, ProvenanceError> {
        Ok(self.state(quantum)?.status())
    }

    /// Reported attempts, without blocking applied.
    ///
    /// # Errors
    /// [`ProvenanceError::UnknownQuantum`].
    pub fn history(&self, quantum: QuantumId) -> Result<QuantumHistory, ProvenanceError> {
        Ok(self.node(quantum)?.history.lock().clone())
    }

    /// # Errors
    /// [`ProvenanceError::UnknownQuantum`].
    pub fn blocked_by(&self, quantum: QuantumId) -> Result<BTreeSet<QuantumId>, ProvenanceError> {
        Ok(self.state(quantum)?.blocked_by())
    }

    #[must_use]
    pub fn log(&self) -> &IngestLog {
        &self.log
    }
}

/// Every recorded attempt must match the last log entry for it, and the log
/// must name no attempt the histories lack.
fn check_histories_against_log(quanta: &[QuantumSnapshot], entries: &[IngestEntry]) -> Result<(), ProvenanceError> {
    let mut logged: HashMap<(QuantumId, u32), (QuantumStatus, QuantumSuccessCaveats)> = HashMap::new();
    for e in entries {
        logged.insert((e.quantum, e.attempt), (e.status, e.caveats));
    }

    let mut recorded = 0;
    for q in quanta {
        for r in q.history.attempts.values() {
            recorded += 1;
            if logged.get(&(q.id, r.attempt)) != Some(&(r.outcome.status, r.outcome.caveats)) {
                return Err(ProvenanceError::InvalidSnapshot(format!(
                    "quantum {} attempt {} does not match the ingestion log",
                    q.id, r.attempt
                )));
            }
        }
    }
    if recorded != logged.len() {
        return Err(ProvenanceError::InvalidSnapshot(
            "ingestion log records attempts missing from the histories".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quanta_core::{Connection, DataCoordinate, DatasetType, DimensionUniverse, GraphBuilder, TaskConnections, TaskDef};
    use std::sync::Arc;

    /// a → b → c over one global dataset chain.
    fn chain() -> (QuantumGraph, [QuantumId; 3]) {
        let universe = Arc::new(DimensionUniverse::builder().build().unwrap());
        let t = |label: &str, input: &str, output: &str| {
            let connections = TaskConnections::builder(&[])
                .with_connection(Connection::input("in", DatasetType::global(input, "Dict")))
                .with_connection(Connection::output("out", DatasetType::global(output, "Dict")))
                .freeze()
                .unwrap();
            TaskDef::new(label, "Noop", connections).unwrap()
        };
        let catalog = vec![DatasetRef::existing("d0", DataCoordinate::empty(), "in", Utc::now())];
        let graph = GraphBuilder::new(universe)
            .build(vec![t("a", "d0", "d1"), t("b", "d1", "d2"), t("c", "d2", "d3")], &catalog)
            .unwrap();
        let id = |label: &str| graph.quanta_for_task(label).next().unwrap().id;
        let ids = [id("a"), id("b"), id("c")];
        (graph, ids)
    }

    #[test]
    fn unrun_quanta_are_not_run() {
        let (graph, [a, ..]) = chain();
        let pg = QuantumProvenanceGraph::new(&graph);
        assert_eq!(pg.len(), 3);
        assert_eq!(pg.status(a).unwrap(), QuantumStatus::NotRun);
        assert!(matches!(
            pg.status(QuantumId::new()),
            Err(ProvenanceError::UnknownQuantum(_))
        ));
    }

    #[test]
    fn reingesting_same_outcome_is_a_no_op() {
        let (graph, [a, ..]) = chain();
        let pg = QuantumProvenanceGraph::new(&graph);
        assert_eq!(
            pg.ingest(a, 1, AttemptOutcome::succeeded()).unwrap(),
            IngestResult::Recorded(QuantumStatus::Succeeded)
        );
        let before = pg.history(a).unwrap();
        assert_eq!(pg.ingest(a, 1, AttemptOutcome::succeeded()).unwrap(), IngestResult::Unchanged);
        assert_eq!(pg.history(a).unwrap(), before);
        assert_eq!(pg.log().len(), 1);
    }

    #[test]
    fn conflicting_outcome_keeps_first_record() {
        let (graph, [a, ..]) = chain();
        let pg = QuantumProvenanceGraph::new(&graph);
        pg.ingest(a, 1, AttemptOutcome::failed("boom")).unwrap();
        let err = pg.ingest(a, 1, AttemptOutcome::succeeded()).unwrap_err();
        assert!(matches!(err, ProvenanceError::ProvenanceConflict { attempt: 1, .. }));
        assert!(err.is_corruption());
        assert_eq!(pg.status(a).unwrap(), QuantumStatus::Failed);
    }

    #[test]
    fn running_progresses_within_an_attempt() {
        let (graph, [a, ..]) = chain();
        let pg = QuantumProvenanceGraph::new(&graph);
        pg.ingest(a, 1, AttemptOutcome::running()).unwrap();
        assert_eq!(pg.status(a).unwrap(), QuantumStatus::Running);
        pg.ingest(a, 1, AttemptOutcome::succeeded()).unwrap();
        assert_eq!(pg.status(a).unwrap(), QuantumStatus::Succeeded);
        assert_eq!(pg.history(a).unwrap().attempts.len(), 1);
    }

    #[test]
    fn older_attempts_are_rejected() {
        let (graph, [a, ..]) = chain();
        let pg = QuantumProvenanceGraph::new(&graph);
        pg.ingest(a, 2, AttemptOutcome::failed("x")).unwrap();
        assert!(matches!(
            pg.ingest(a, 1, AttemptOutcome::succeeded()),
            Err(ProvenanceError::AttemptOutOfOrder { attempt: 1, latest: 2, .. })
        ));
    }

    #[test]
    fn blocking_is_attributed_to_the_root_failure() {
        let (graph, [a, b, c]) = chain();
        let pg = QuantumProvenanceGraph::new(&graph);
        pg.ingest(a, 1, AttemptOutcome::failed("boom")).unwrap();
        pg.ingest(b, 1, AttemptOutcome::failed("no input")).unwrap();
        pg.ingest(c, 1, AttemptOutcome::failed("no input")).unwrap();

        assert_eq!(pg.status(b).unwrap(), QuantumStatus::Blocked);
        assert_eq!(pg.status(c).unwrap(), QuantumStatus::Blocked);
        assert_eq!(pg.blocked_by(b).unwrap(), BTreeSet::from([a]));
        assert_eq!(pg.blocked_by(c).unwrap(), BTreeSet::from([a]));
    }

    #[test]
    fn blocking_does_not_depend_on_arrival_order() {
        let (graph, [a, b, c]) = chain();
        let pg = QuantumProvenanceGraph::new(&graph);
        assert_eq!(
            pg.ingest(b, 1, AttemptOutcome::failed("no input")).unwrap(),
            IngestResult::Provisional(QuantumStatus::Failed)
        );
        pg.ingest(a, 1, AttemptOutcome::failed("boom")).unwrap();
        pg.ingest(c, 1, AttemptOutcome::failed("no input")).unwrap();

        assert_eq!(pg.status(b).unwrap(), QuantumStatus::Blocked);
        assert_eq!(pg.blocked_by(b).unwrap(), BTreeSet::from([a]));
        assert_eq!(pg.status(c).unwrap(), QuantumStatus::Blocked);
        assert_eq!(pg.blocked_by(c).unwrap(), BTreeSet::from([a]));
    }

    #[test]
    fn success_before_upstream_reports_is_provisional() {
        let (graph, [a, b, _]) = chain();
        let pg = QuantumProvenanceGraph::new(&graph);
        assert_eq!(
            pg.ingest(b, 1, AttemptOutcome::succeeded()).unwrap(),
            IngestResult::Provisional(QuantumStatus::Succeeded)
        );
        assert_eq!(pg.status(b).unwrap(), QuantumStatus::Succeeded);

        pg.ingest(a, 1, AttemptOutcome::failed("boom")).unwrap();
        assert_eq!(pg.status(b).unwrap(), QuantumStatus::Blocked);
        assert_eq!(pg.blocked_by(b).unwrap(), BTreeSet::from([a]));
        // the reported outcome is kept as it arrived
        assert_eq!(pg.history(b).unwrap().attempts[&1].outcome.status, QuantumStatus::Succeeded);
    }

    #[test]
    fn recovery_unblocks_later_attempts() {
        let (graph, [a, b, _]) = chain();
        let pg = QuantumProvenanceGraph::new(&graph);
        pg.ingest(a, 1, AttemptOutcome::failed("boom")).unwrap();
        pg.ingest(b, 1, AttemptOutcome::failed("no input")).unwrap();
        pg.ingest(a, 2, AttemptOutcome::succeeded()).unwrap();
        pg.ingest(b, 2, AttemptOutcome::succeeded()).unwrap();
        assert_eq!(pg.status(b).unwrap(), QuantumStatus::Succeeded);
        assert!(pg.blocked_by(b).unwrap().is_empty());
    }

    #[test]
    fn success_can_be_downgraded_and_is_wonky() {
        let (graph, [a, ..]) = chain();
        let pg = QuantumProvenanceGraph::new(&graph);
        pg.ingest(a, 1, AttemptOutcome::succeeded_with(QuantumSuccessCaveats::NO_WORK_FOUND))
            .unwrap();
        pg.ingest(a, 2, AttemptOutcome::failed("late failure")).unwrap();
        let state = pg.state(a).unwrap();
        assert_eq!(state.status(), QuantumStatus::Failed);
        assert!(state.is_wonky());
    }

    #[test]
    fn snapshot_round_trips() {
        let (graph, [a, b, _]) = chain();
        let pg = QuantumProvenanceGraph::new(&graph);
        pg.ingest(a, 1, AttemptOutcome::failed("boom")).unwrap();
        pg.ingest(b, 1, AttemptOutcome::succeeded()).unwrap();

        let json = serde_json::to_string(&pg.snapshot()).unwrap();
        let restored = QuantumProvenanceGraph::from_snapshot(serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(restored.status(b).unwrap(), QuantumStatus::Blocked);
        assert_eq!(restored.log().len(), 2);
        assert_eq!(restored.snapshot(), pg.snapshot());
    }

    #[test]
    fn snapshot_history_must_match_the_log() {
        let (graph, [a, b, _]) = chain();
        let pg = QuantumProvenanceGraph::new(&graph);
        pg.ingest(a, 1, AttemptOutcome::failed("boom")).unwrap();
        pg.ingest(b, 1, AttemptOutcome::succeeded()).unwrap();

        let mut edited = pg.snapshot();
        let record = edited.quanta[0].history.attempts.get_mut(&1).unwrap();
        record.outcome = AttemptOutcome::succeeded();
        assert!(matches!(
            QuantumProvenanceGraph::from_snapshot(edited),
            Err(ProvenanceError::InvalidSnapshot(_))
        ));

        let mut dropped = pg.snapshot();
        dropped.quanta[1].history.attempts.clear();
        assert!(matches!(
            QuantumProvenanceGraph::from_snapshot(dropped),
            Err(ProvenanceError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn snapshot_listing_downstream_first_is_rejected() {
        let (graph, _) = chain();
        let pg = QuantumProvenanceGraph::new(&graph);
        let mut snapshot = pg.snapshot();
        snapshot.quanta.reverse();
        assert!(matches!(
            QuantumProvenanceGraph::from_snapshot(snapshot),
            Err(ProvenanceError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn snapshot_with_dangling_upstream_is_rejected() {
        let snapshot = ProvenanceSnapshot {
            quanta: vec![QuantumSnapshot {
                id: QuantumId::new(),
                task: "a".into(),
                coordinate: "{}".into(),
                upstream: vec![QuantumId::new()],
                outputs: Vec::new(),
                history: QuantumHistory::default(),
            }],
            log: Vec::new(),
        };
        assert!(matches!(
            QuantumProvenanceGraph::from_snapshot(snapshot),
            Err(ProvenanceError::InvalidSnapshot(_))
        ));
    }
}
