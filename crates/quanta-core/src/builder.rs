//! Quantum graph builder
//!
//! Turns task definitions plus a dataset catalog into a [`QuantumGraph`].
//!
//! Usage:
//! ```rust,ignore
//! let builder = GraphBuilder::new(universe).with_config(BuildConfig::default());
//! let graph = builder.build(task_defs, &catalog)?;
//! for step in graph.traverse() {
//!     println!("{} depends on {:?}", step.index, step.dependencies);
//! }
//! ```
//!
//! Tasks are processed in producer-before-consumer order. For each task the
//! quantum coordinates are the join, on the task dimensions, of every regular
//! input whose dimensions cover the task dimensions. Inputs are resolved per
//! quantum; several versions of one dataset collapse to a single winner
//! (predicted by this graph, else most recently produced). Prerequisites are
//! looked up in the catalog only; spatial prerequisites are restricted to the
//! sky the quantum actually touches.

use crate::config::BuildConfig;
use crate::connections::{Connection, ConnectionKind, Multiplicity, TaskDef};
use crate::coordinate::DataCoordinate;
use crate::dataset::{DatasetRef, DatasetType};
use crate::dimensions::DimensionUniverse;
use crate::error::{ConnectionError, GraphConstructionError};
use crate::graph::{GlobalInitOutputs, QuantumGraph};
use crate::quantum::Quantum;
use crate::region::Region;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Name of the graph-wide software-versions dataset
pub const PACKAGES_DATASET: &str = "packages";

/// Read access to the external dataset catalog
pub trait DatasetQuery {
    /// Every known dataset of `dataset_type`, all versions included.
    fn datasets_of_type(&self, dataset_type: &str) -> Vec<DatasetRef>;
}

impl DatasetQuery for [DatasetRef] {
    fn datasets_of_type(&self, dataset_type: &str) -> Vec<DatasetRef> {
        self.iter()
            .filter(|r| r.dataset_type == dataset_type)
            .cloned()
            .collect()
    }
}

impl DatasetQuery for Vec<DatasetRef> {
    fn datasets_of_type(&self, dataset_type: &str) -> Vec<DatasetRef> {
        self.as_slice().datasets_of_type(dataset_type)
    }
}

/// Builds [`QuantumGraph`]s against one dimension universe
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    universe: Arc<DimensionUniverse>,
    config: BuildConfig,
}

/// Per-build working state: catalog cache plus refs predicted so far
struct Available<'q, Q: ?Sized> {
    catalog: &'q Q,
    catalog_cache: HashMap<String, Vec<DatasetRef>>,
    predicted: HashMap<String, Vec<DatasetRef>>,
}

impl<'q, Q: DatasetQuery + ?Sized> Available<'q, Q> {
    fn catalog(&mut self, dataset_type: &str) -> &[DatasetRef] {
        let catalog = self.catalog;
        self.catalog_cache
            .entry(dataset_type.to_string())
            .or_insert_with(|| catalog.datasets_of_type(dataset_type))
    }

    /// Catalog plus predicted refs.
    fn all(&mut self, dataset_type: &str) -> Vec<DatasetRef> {
        let mut out = self.catalog(dataset_type).to_vec();
        if let Some(p) = self.predicted.get(dataset_type) {
            out.extend(p.iter().cloned());
        }
        out
    }

    fn predict(&mut self, dataset: DatasetRef) {
        self.predicted
            .entry(dataset.dataset_type.clone())
            .or_default()
            .push(dataset);
    }
}

impl GraphBuilder {
    #[must_use]
    pub fn new(universe: Arc<DimensionUniverse>) -> Self {
        Self {
            universe,
            config: BuildConfig::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Build a graph. Never returns a partial graph.
    ///
    /// # Errors
    /// Any [`GraphConstructionError`]: duplicate producers, colliding
    /// outputs, unresolvable or ambiguous inputs, cycles, or dimension errors.
    pub fn build<Q>(
        &self,
        tasks: impl IntoIterator<Item = TaskDef>,
        catalog: &Q,
    ) -> Result<QuantumGraph, GraphConstructionError>
    where
        Q: DatasetQuery + ?Sized,
    {
        let tasks: Vec<TaskDef> = tasks.into_iter().collect();
        self.check_declarations(&tasks)?;
        let ordered = order_tasks(&tasks, self.config.metadata_outputs)?;

        let mut available = Available {
            catalog,
            catalog_cache: HashMap::new(),
            predicted: HashMap::new(),
        };
        let mut init_outputs = GlobalInitOutputs::default();
        let mut quanta = Vec::new();
        let mut claimed: HashMap<DatasetRef, String> = HashMap::new();

        for def in ordered.iter().map(|&i| &tasks[i]) {
            let global = self.task_init_outputs(def);
            for r in &global {
                available.predict(r.clone());
            }
            init_outputs.per_task.insert(def.label.clone(), global);

            let task_quanta = self.quanta_for_task(def, &mut available)?;
            tracing::debug!(task = %def.label, quanta = task_quanta.len(), "task expanded");

            for q in &task_quanta {
                for out in &q.outputs {
                    if let Some(prev) = claimed.insert(out.clone(), def.label.clone()) {
                        return Err(GraphConstructionError::OutputCollision {
                            dataset: out.to_string(),
                            first: prev,
                            second: def.label.clone(),
                        });
                    }
                }
            }
            for q in &task_quanta {
                for out in &q.outputs {
                    available.predict(out.clone());
                }
            }
            quanta.extend(task_quanta);
        }

        if self.config.packages_dataset {
            init_outputs.packages = Some(DatasetRef::predicted(
                PACKAGES_DATASET,
                DataCoordinate::empty(),
                self.config.output_run.clone(),
            ));
        }

        let task_order: Vec<TaskDef> = ordered.iter().map(|&i| tasks[i].clone()).collect();
        let graph = QuantumGraph::new(self.universe.clone(), task_order, quanta, init_outputs)?;
        tracing::info!(
            tasks = tasks.len(),
            quanta = graph.len(),
            edges = graph.edge_count(),
            "quantum graph built"
        );
        Ok(graph)
    }

    /// Every dimension mentioned must exist, and labels must be unique.
    fn check_declarations(&self, tasks: &[TaskDef]) -> Result<(), GraphConstructionError> {
        let mut labels = BTreeSet::new();
        for def in tasks {
            if !labels.insert(def.label.as_str()) {
                return Err(GraphConstructionError::DuplicateTask(def.label.clone()));
            }
            self.universe.expand(def.dimensions())?;
            for c in def.connections.iter() {
                self.universe.expand(&c.dataset_type.dimensions)?;
            }
        }
        Ok(())
    }

    fn task_init_outputs(&self, def: &TaskDef) -> Vec<DatasetRef> {
        def.connections
            .init_outputs()
            .map(|c| c.dataset_type.name.clone())
            .chain(std::iter::once(def.config_dataset_type().name))
            .map(|name| DatasetRef::predicted(name, DataCoordinate::empty(), self.config.output_run.clone()))
            .collect()
    }

    fn quanta_for_task<Q: DatasetQuery + ?Sized>(
        &self,
        def: &TaskDef,
        available: &mut Available<'_, Q>,
    ) -> Result<Vec<Quantum>, GraphConstructionError> {
        let task_dims = self.universe.expand(def.dimensions())?;

        let mut init_inputs = Vec::new();
        for conn in def.connections.init_inputs() {
            let matches = resolve_versions(&available.all(&conn.dataset_type.name))?;
            if matches.len() != 1 {
                return Err(unresolved(def, conn, &DataCoordinate::empty(), matches.len()));
            }
            init_inputs.extend(matches);
        }

        let mut coordinates: Option<BTreeSet<DataCoordinate>> = None;
        for conn in def.connections.inputs() {
            let input_dims = self.universe.expand(&conn.dataset_type.dimensions)?;
            if !input_dims.is_superset(&task_dims) {
                continue;
            }
            let projected: BTreeSet<DataCoordinate> = available
                .all(&conn.dataset_type.name)
                .iter()
                .map(|r| r.coordinate.subset(&task_dims))
                .collect();
            coordinates = Some(match coordinates {
                None => projected,
                Some(prev) => prev.intersection(&projected).cloned().collect(),
            });
        }
        let coordinates = match coordinates {
            Some(c) => c,
            None if task_dims.is_empty() => std::iter::once(DataCoordinate::empty()).collect(),
            None => {
                tracing::warn!(task = %def.label, "no input covers the task dimensions; no quanta generated");
                BTreeSet::new()
            }
        };

        let mut quanta = Vec::with_capacity(coordinates.len());
        for coordinate in coordinates {
            let coordinate = self.universe.normalize(&coordinate)?;
            let mut quantum = Quantum::new(def.label.clone(), coordinate.clone());

            for conn in def.connections.inputs() {
                let candidates = available.all(&conn.dataset_type.name);
                let matches = resolve_versions(
                    &candidates
                        .into_iter()
                        .filter(|r| r.coordinate.is_compatible(&coordinate))
                        .collect::<Vec<_>>(),
                )?;
                if conn.multiplicity == Multiplicity::Single && matches.len() != 1 {
                    return Err(unresolved(def, conn, &coordinate, matches.len()));
                }
                quantum.inputs.extend(matches);
            }

            for conn in def.connections.outputs() {
                quantum.outputs.push(self.predict_output(&conn.dataset_type, &coordinate)?);
            }
            if self.config.metadata_outputs {
                quantum
                    .outputs
                    .push(self.predict_output(&def.metadata_dataset_type(), &coordinate)?);
            }

            for conn in def.connections.prerequisites() {
                let found = self.resolve_prerequisite(conn, &quantum, available)?;
                if conn.multiplicity == Multiplicity::Single && found.len() != 1 {
                    return Err(unresolved(def, conn, &coordinate, found.len()));
                }
                quantum.prerequisites.extend(found);
            }

            quantum.init_inputs.clone_from(&init_inputs);
            quanta.push(quantum);
        }
        Ok(quanta)
    }

    fn predict_output(
        &self,
        dataset_type: &DatasetType,
        coordinate: &DataCoordinate,
    ) -> Result<DatasetRef, GraphConstructionError> {
        let dims = self.universe.expand(&dataset_type.dimensions)?;
        Ok(DatasetRef::predicted(
            dataset_type.name.clone(),
            coordinate.subset(&dims),
            self.config.output_run.clone(),
        ))
    }

    /// Catalog lookup for one prerequisite connection of one quantum.
    ///
    /// Spatial prerequisites must overlap the quantum region; for a quantum
    /// with no region of its own, the union of the regions of its resolved
    /// inputs and declared outputs is used instead. With no region at all
    /// nothing spatial is selected.
    ///
    /// Output dimensions are a subset of the task dimensions, so an output
    /// only has a region when the quantum already does. In practice the
    /// fallback union comes from the inputs.
    fn resolve_prerequisite<Q: DatasetQuery + ?Sized>(
        &self,
        conn: &Connection,
        quantum: &Quantum,
        available: &mut Available<'_, Q>,
    ) -> Result<Vec<DatasetRef>, GraphConstructionError> {
        let prereq_dims = self.universe.expand(&conn.dataset_type.dimensions)?;
        let compatible: Vec<DatasetRef> = available
            .catalog(&conn.dataset_type.name)
            .iter()
            .filter(|r| r.coordinate.is_compatible(&quantum.coordinate))
            .cloned()
            .collect();

        if !self.universe.is_spatial(&prereq_dims) {
            return resolve_versions(&compatible);
        }

        let constraint = self.universe.region_of(&quantum.coordinate).or_else(|| {
            let regions: Vec<Region> = quantum
                .inputs
                .iter()
                .chain(quantum.outputs.iter())
                .filter_map(|r| self.universe.region_of(&r.coordinate))
                .collect();
            let union = Region::union_all(&regions);
            (!union.is_empty()).then_some(union)
        });
        let Some(constraint) = constraint else {
            tracing::debug!(
                quantum = %quantum,
                prerequisite = %conn.name,
                "no spatial constraint available; spatial prerequisite left empty"
            );
            return Ok(Vec::new());
        };

        let selected: Vec<DatasetRef> = compatible
            .into_iter()
            .filter(|r| {
                self.universe
                    .region_of(&r.coordinate)
                    .is_some_and(|region| region.intersects(&constraint))
            })
            .collect();
        tracing::debug!(
            quantum = %quantum,
            prerequisite = %conn.name,
            selected = selected.len(),
            "spatial prerequisite resolved"
        );
        resolve_versions(&selected)
    }
}

fn unresolved(def: &TaskDef, conn: &Connection, coordinate: &DataCoordinate, found: usize) -> GraphConstructionError {
    GraphConstructionError::UnresolvedInput {
        task: def.label.clone(),
        connection: conn.name.clone(),
        coordinate: coordinate.to_string(),
        found,
    }
}

/// Collapse versions of the same logical dataset to one winner each.
///
/// A predicted ref beats any stored version; otherwise the most recent
/// production time wins and a tie on it is ambiguous.
fn resolve_versions(candidates: &[DatasetRef]) -> Result<Vec<DatasetRef>, GraphConstructionError> {
    let mut groups: BTreeMap<&DatasetRef, Vec<&DatasetRef>> = BTreeMap::new();
    for r in candidates {
        groups.entry(r).or_default().push(r);
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, versions) in groups {
        if let Some(predicted) = versions.iter().find(|r| r.is_predicted()) {
            out.push((*predicted).clone());
            continue;
        }
        let newest = versions.iter().filter_map(|r| r.produced_at).max();
        let winners: Vec<&&DatasetRef> = versions
            .iter()
            .filter(|r| r.produced_at == newest)
            .collect();
        if winners.len() > 1 {
            return Err(GraphConstructionError::AmbiguousDataset {
                dataset_type: key.dataset_type.clone(),
                coordinate: key.coordinate.to_string(),
                candidates: winners.len(),
            });
        }
        out.push((*winners[0]).clone());
    }
    Ok(out)
}

/// Order task indices producer-before-consumer.
fn order_tasks(tasks: &[TaskDef], metadata_outputs: bool) -> Result<Vec<usize>, GraphConstructionError> {
    let mut producer: HashMap<String, usize> = HashMap::new();
    for (i, def) in tasks.iter().enumerate() {
        let mut produced: Vec<String> = def
            .connections
            .iter()
            .filter(|c| matches!(c.kind, ConnectionKind::Output | ConnectionKind::InitOutput))
            .map(|c| c.dataset_type.name.clone())
            .collect();
        produced.push(def.config_dataset_type().name);
        if metadata_outputs {
            produced.push(def.metadata_dataset_type().name);
        }
        for name in produced {
            if let Some(&prev) = producer.get(&name) {
                return Err(GraphConstructionError::DuplicateOutput {
                    dataset_type: name,
                    first: tasks[prev].label.clone(),
                    second: def.label.clone(),
                });
            }
            producer.insert(name, i);
        }
    }

    let mut dag: DiGraphMap<usize, ()> = DiGraphMap::new();
    for (i, def) in tasks.iter().enumerate() {
        dag.add_node(i);
        for c in def.connections.iter() {
            if matches!(c.kind, ConnectionKind::PrerequisiteInput) {
                if let Some(&p) = producer.get(&c.dataset_type.name) {
                    return Err(GraphConstructionError::InvalidConnections {
                        task: def.label.clone(),
                        source: ConnectionError::PrerequisiteProducedInGraph {
                            name: c.name.clone(),
                            producer: tasks[p].label.clone(),
                        },
                    });
                }
                continue;
            }
            if matches!(c.kind, ConnectionKind::Input | ConnectionKind::InitInput) {
                if let Some(&p) = producer.get(&c.dataset_type.name) {
                    if p == i {
                        return Err(GraphConstructionError::Cycle(def.label.clone()));
                    }
                    dag.add_edge(p, i, ());
                }
            }
        }
    }

    toposort(&dag, None).map_err(|cycle| GraphConstructionError::Cycle(tasks[cycle.node_id()].label.clone()))
}
