//! Quantum graph
//!
//! An immutable DAG of quanta. Quantum `A` depends on quantum `B` iff some
//! output ref of `B` equals an input or prerequisite ref of `A`. Both
//! invariants (acyclic, one producer per output) are checked once in
//! [`QuantumGraph::new`]; the graph is never mutated afterwards.

use crate::connections::TaskDef;
use crate::dataset::DatasetRef;
use crate::dimensions::DimensionUniverse;
use crate::error::GraphConstructionError;
use crate::quantum::{Quantum, QuantumId};
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// One step of [`QuantumGraph::traverse`]
#[derive(Debug, Clone)]
pub struct QuantumIterData<'a> {
    /// Position in traversal order
    pub index: usize,
    pub quantum: &'a Quantum,
    pub task: &'a TaskDef,
    /// Traversal indices of direct upstream quanta; all smaller than `index`
    pub dependencies: BTreeSet<usize>,
}

/// Graph-global datasets written once per execution rather than per quantum
#[derive(Debug, Clone, Default)]
pub struct GlobalInitOutputs {
    pub per_task: BTreeMap<String, Vec<DatasetRef>>,
    pub packages: Option<DatasetRef>,
}

#[derive(Debug)]
pub struct QuantumGraph {
    universe: Arc<DimensionUniverse>,
    tasks: IndexMap<String, TaskDef>,
    quanta: HashMap<QuantumId, Quantum>,
    dag: DiGraphMap<QuantumId, ()>,
    order: Vec<QuantumId>,
    index_of: HashMap<QuantumId, usize>,
    producers: HashMap<DatasetRef, QuantumId>,
    init_outputs: GlobalInitOutputs,
}

impl QuantumGraph {
    /// Assemble a graph from already-resolved quanta.
    ///
    /// # Errors
    /// - [`GraphConstructionError::UnknownTask`] for a quantum whose task is
    ///   not among `tasks`
    /// - [`GraphConstructionError::OutputCollision`] when two quanta share an
    ///   output
    /// - [`GraphConstructionError::Cycle`] when the derived edges are cyclic
    pub fn new(
        universe: Arc<DimensionUniverse>,
        tasks: impl IntoIterator<Item = TaskDef>,
        quanta: impl IntoIterator<Item = Quantum>,
        init_outputs: GlobalInitOutputs,
    ) -> Result<Self, GraphConstructionError> {
        let tasks: IndexMap<String, TaskDef> =
            tasks.into_iter().map(|t| (t.label.clone(), t)).collect();
        let quanta: HashMap<QuantumId, Quantum> = quanta.into_iter().map(|q| (q.id, q)).collect();
        if let Some(q) = quanta.values().find(|q| !tasks.contains_key(&q.task)) {
            return Err(GraphConstructionError::UnknownTask {
                quantum: q.to_string(),
                task: q.task.clone(),
            });
        }

        let mut producers: HashMap<DatasetRef, QuantumId> = HashMap::new();
        for q in quanta.values() {
            for out in &q.outputs {
                if let Some(prev) = producers.insert(out.clone(), q.id) {
                    return Err(GraphConstructionError::OutputCollision {
                        dataset: out.to_string(),
                        first: quanta[&prev].task.clone(),
                        second: q.task.clone(),
                    });
                }
            }
        }

        let mut dag = DiGraphMap::new();
        for id in quanta.keys() {
            dag.add_node(*id);
        }
        for q in quanta.values() {
            for input in q.all_inputs() {
                if let Some(&producer) = producers.get(input) {
                    if producer == q.id {
                        return Err(GraphConstructionError::Cycle(q.to_string()));
                    }
                    dag.add_edge(producer, q.id, ());
                }
            }
        }

        let order = toposort(&dag, None)
            .map_err(|cycle| GraphConstructionError::Cycle(quanta[&cycle.node_id()].to_string()))?;
        let index_of = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        Ok(Self {
            universe,
            tasks,
            quanta,
            dag,
            order,
            index_of,
            producers,
            init_outputs,
        })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.quanta.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quanta.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.dag.edge_count()
    }

    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> &Arc<DimensionUniverse> {
        &self.universe
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: QuantumId) -> Option<&Quantum> {
        self.quanta.get(&id)
    }

    /// Quanta in topological order.
    pub fn quanta(&self) -> impl Iterator<Item = &Quantum> {
        self.order.iter().map(|id| &self.quanta[id])
    }

    pub fn quanta_for_task<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Quantum> + 'a {
        self.quanta().filter(move |q| q.task == label)
    }

    /// Task definitions in pipeline order.
    pub fn task_defs(&self) -> impl Iterator<Item = &TaskDef> {
        self.tasks.values()
    }

    #[must_use]
    pub fn task_def(&self, label: &str) -> Option<&TaskDef> {
        self.tasks.get(label)
    }

    /// Direct upstream quanta.
    #[must_use]
    pub fn dependencies(&self, id: QuantumId) -> Vec<QuantumId> {
        if !self.dag.contains_node(id) {
            return Vec::new();
        }
        self.dag.neighbors_directed(id, Direction::Incoming).collect()
    }

    /// Direct downstream quanta.
    #[must_use]
    pub fn dependents(&self, id: QuantumId) -> Vec<QuantumId> {
        if !self.dag.contains_node(id) {
            return Vec::new();
        }
        self.dag.neighbors_directed(id, Direction::Outgoing).collect()
    }

    /// Every quantum `id` transitively depends on.
    #[must_use]
    pub fn upstream(&self, id: QuantumId) -> BTreeSet<QuantumId> {
        let mut seen = BTreeSet::new();
        let mut stack = self.dependencies(id);
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.dependencies(next));
            }
        }
        seen
    }

    /// Quanta with no upstream dependencies.
    #[must_use]
    pub fn entry_quanta(&self) -> Vec<QuantumId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.dag.neighbors_directed(*id, Direction::Incoming).next().is_none())
            .collect()
    }

    /// Quanta nothing else depends on.
    #[must_use]
    pub fn exit_quanta(&self) -> Vec<QuantumId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.dag.neighbors_directed(*id, Direction::Outgoing).next().is_none())
            .collect()
    }

    #[must_use]
    pub fn producer_of(&self, dataset: &DatasetRef) -> Option<QuantumId> {
        self.producers.get(dataset).copied()
    }

    /// Graph-global init outputs registered for `task` (declared init
    /// outputs plus the task's config dataset). Empty for unknown tasks.
    #[must_use]
    pub fn global_init_output_refs(&self, task: &str) -> &[DatasetRef] {
        self.init_outputs
            .per_task
            .get(task)
            .map_or(&[], Vec::as_slice)
    }

    /// The graph-wide software-versions dataset, if one was registered.
    #[must_use]
    pub fn packages_ref(&self) -> Option<&DatasetRef> {
        self.init_outputs.packages.as_ref()
    }

    /// Inputs consumed by some quantum but produced by none: what the graph
    /// needs from storage before it can run.
    #[must_use]
    pub fn overall_inputs(&self) -> BTreeSet<DatasetRef> {
        self.quanta
            .values()
            .flat_map(|q| q.all_inputs().chain(q.init_inputs.iter()))
            .filter(|r| !self.producers.contains_key(*r))
            .filter(|r| {
                !self
                    .init_outputs
                    .per_task
                    .values()
                    .any(|refs| refs.contains(*r))
            })
            .cloned()
            .collect()
    }

    /// Topologically ordered iteration with dependency indices, one step
    /// per quantum.
    pub fn traverse(&self) -> impl Iterator<Item = QuantumIterData<'_>> {
        // every ordered id is a quantum and every quantum's task is known
        self.order.iter().enumerate().map(move |(index, id)| {
            let quantum = &self.quanta[id];
            let task = &self.tasks[quantum.task.as_str()];
            let dependencies = self
                .dag
                .neighbors_directed(*id, Direction::Incoming)
                .filter_map(|dep| self.index_of.get(&dep).copied())
                .collect();
            QuantumIterData {
                index,
                quantum,
                task,
                dependencies,
            }
        })
    }
}
