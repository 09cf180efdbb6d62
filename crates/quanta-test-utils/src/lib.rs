//! Testing utilities for the Quanta workspace
//!
//! A standard dimension universe with two patches and reference-catalog
//! shards, dataset helpers, fixture tasks and a three-task chain pipeline.

#![allow(missing_docs)]

use chrono::{TimeZone, Utc};
use quanta_core::{
    BuildConfig, Connection, DataCoordinate, DatasetRef, DatasetType, DimensionUniverse, GraphBuilder,
    Pixelization, Quantum, QuantumGraph, TaskConnections, TaskDef,
};
use quanta_exec::{ExecutionContext, InMemoryStore, PipelineTask, TaskOutcome, TaskRegistry};
use serde_json::{json, Value};
use std::sync::Arc;

pub const INSTRUMENT: &str = "Cam";
pub const SKYMAP: &str = "sky";
pub const TRACT: i64 = 0;
pub const PATCH_A: i64 = 1;
pub const PATCH_Z: i64 = 26;
pub const HTM_LEVEL: u8 = 7;
/// htm7 shard inside patch A
pub const SHARD_A: i64 = 101;
/// htm7 shard inside patch Z
pub const SHARD_Z: i64 = 901;

fn htm7() -> Pixelization {
    Pixelization::new(HTM_LEVEL)
}

/// instrument, detector, visit (spatial), skymap, tract, patch (spatial)
/// and the htm7 pixelization. Visit 1 lies inside patch A, visit 2 inside
/// patch Z.
pub fn standard_universe() -> Arc<DimensionUniverse> {
    let universe = DimensionUniverse::builder()
        .dimension("instrument", &[])
        .dimension("detector", &["instrument"])
        .spatial("visit", &["instrument"])
        .dimension("skymap", &[])
        .dimension("tract", &["skymap"])
        .spatial("patch", &["skymap", "tract"])
        .skypix("htm7", HTM_LEVEL)
        .region("patch", PATCH_A, htm7().pixels(100, 103).unwrap())
        .region("patch", PATCH_Z, htm7().pixels(900, 903).unwrap())
        .region("visit", 1, htm7().pixels(100, 101).unwrap())
        .region("visit", 2, htm7().pixels(900, 901).unwrap())
        .build()
        .unwrap();
    Arc::new(universe)
}

pub fn visit_detector(visit: i64, detector: i64) -> DataCoordinate {
    DataCoordinate::empty()
        .with("instrument", INSTRUMENT)
        .with("visit", visit)
        .with("detector", detector)
}

pub fn visit(visit: i64) -> DataCoordinate {
    DataCoordinate::empty().with("instrument", INSTRUMENT).with("visit", visit)
}

pub fn patch(patch: i64) -> DataCoordinate {
    DataCoordinate::empty()
        .with("skymap", SKYMAP)
        .with("tract", TRACT)
        .with("patch", patch)
}

pub fn shard(index: i64) -> DataCoordinate {
    DataCoordinate::empty().with("htm7", index)
}

/// A stored dataset produced `secs` after the epoch.
pub fn stored(name: &str, coordinate: DataCoordinate, secs: i64) -> DatasetRef {
    DatasetRef::existing(name, coordinate, "ingest", Utc.timestamp_opt(secs, 0).unwrap())
}

pub fn raw_type() -> DatasetType {
    DatasetType::new("raw", &["instrument", "visit", "detector"], "Exposure")
}

pub fn refcat_type() -> DatasetType {
    DatasetType::new("refcat", &["htm7"], "SimpleCatalog")
}

/// Store seeded with `refs`, each holding `{"name": <type>}`.
pub fn seeded_store(refs: impl IntoIterator<Item = DatasetRef>) -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();
    for r in refs {
        let value = json!({ "name": r.dataset_type });
        store.insert(r, value);
    }
    Arc::new(store)
}

pub fn task(label: &str, class: &str, dimensions: &[&str], connections: Vec<Connection>) -> TaskDef {
    let mut builder = TaskConnections::builder(dimensions);
    for c in connections {
        builder.add(c).unwrap();
    }
    TaskDef::new(label, class, builder.freeze().unwrap()).unwrap()
}

/// isr (raw → calexp) → calibrate (calexp → src) → summarize (src per visit
/// → visitSummary), all with the given task classes.
pub fn chain_tasks(classes: [&str; 3]) -> Vec<TaskDef> {
    let vd = ["instrument", "visit", "detector"];
    let calexp = DatasetType::new("calexp", &vd, "Exposure");
    let src = DatasetType::new("src", &vd, "SourceCatalog");
    let summary = DatasetType::new("visitSummary", &["instrument", "visit"], "ExposureCatalog");
    vec![
        task(
            "isr",
            classes[0],
            &vd,
            vec![Connection::input("raw", raw_type()), Connection::output("calexp", calexp.clone())],
        ),
        task(
            "calibrate",
            classes[1],
            &vd,
            vec![Connection::input("calexp", calexp), Connection::output("src", src.clone())],
        ),
        task(
            "summarize",
            classes[2],
            &["instrument", "visit"],
            vec![
                Connection::input("src", src).multiple(),
                Connection::output("summary", summary),
            ],
        ),
    ]
}

/// Chain pipeline graph over one raw per `(visit, detector)`, plus a store
/// holding those raws.
pub fn chain_graph(classes: [&str; 3], raws: &[(i64, i64)]) -> (QuantumGraph, Arc<InMemoryStore>) {
    let store = seeded_store(raws.iter().map(|&(v, d)| stored("raw", visit_detector(v, d), 10)));
    let graph = build_graph(chain_tasks(classes), &store);
    (graph, store)
}

/// Graph over the standard universe with default build settings.
pub fn build_graph(tasks: Vec<TaskDef>, store: &InMemoryStore) -> QuantumGraph {
    GraphBuilder::new(standard_universe())
        .with_config(BuildConfig::default())
        .build(tasks, store)
        .unwrap()
}

pub fn quantum_of<'a>(graph: &'a QuantumGraph, task: &'a str) -> &'a Quantum {
    graph.quanta_for_task(task).next().unwrap()
}

/// Reads its single `input` object, adds `config.key = config.value` and
/// writes it to `output`.
#[derive(Debug)]
pub struct NoDimensionsTask {
    key: String,
    value: Value,
}

impl PipelineTask for NoDimensionsTask {
    fn run_quantum(&self, context: &mut ExecutionContext, quantum: &Quantum) -> anyhow::Result<TaskOutcome> {
        let input = quantum
            .inputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("no input"))?
            .clone();
        let mut data = context.get(&input)?;
        let object = data
            .as_object_mut()
            .ok_or_else(|| anyhow::anyhow!("input is not an object"))?;
        object.insert(self.key.clone(), self.value.clone());
        let output = data_outputs(quantum).next().ok_or_else(|| anyhow::anyhow!("no output"))?;
        context.put(&output, data)?;
        Ok(TaskOutcome::success())
    }
}

/// Reads every input and prerequisite, then writes `{"task", "inputs"}` to
/// each output. Config: `fail` raises after reading, `no_work` writes
/// nothing, `skip` lists output types not to write.
#[derive(Debug, Default)]
pub struct PassThroughTask {
    fail: bool,
    no_work: bool,
    skip: Vec<String>,
}

fn data_outputs(quantum: &Quantum) -> impl Iterator<Item = DatasetRef> + '_ {
    let metadata = format!("{}_metadata", quantum.task);
    quantum
        .outputs
        .iter()
        .filter(move |r| r.dataset_type != metadata)
        .cloned()
}

impl PipelineTask for PassThroughTask {
    fn run_quantum(&self, context: &mut ExecutionContext, quantum: &Quantum) -> anyhow::Result<TaskOutcome> {
        let inputs: Vec<DatasetRef> = quantum.all_inputs().cloned().collect();
        for input in &inputs {
            context.get(input)?;
        }
        if self.fail {
            anyhow::bail!("configured to fail");
        }
        if self.no_work {
            return Ok(TaskOutcome::no_work());
        }
        for output in data_outputs(quantum) {
            if self.skip.contains(&output.dataset_type) {
                continue;
            }
            context.put(&output, json!({ "task": quantum.task, "inputs": inputs.len() }))?;
        }
        Ok(TaskOutcome::success())
    }

    fn init_output_values(&self) -> Vec<(String, Value)> {
        vec![("schema".to_string(), json!({"columns": ["id", "flux"]}))]
    }
}

/// Registry with the `NoDimensions` and `PassThrough` fixture classes.
pub fn fixture_registry() -> TaskRegistry {
    TaskRegistry::new()
        .with("NoDimensions", |def, _client| {
            let key = def
                .config
                .get("key")
                .and_then(Value::as_str)
                .unwrap_or("one")
                .to_string();
            let value = def.config.get("value").cloned().unwrap_or(json!(1));
            Ok(Box::new(NoDimensionsTask { key, value }) as Box<dyn PipelineTask>)
        })
        .with("PassThrough", |def, _client| {
            let flag = |name: &str| def.config.get(name).and_then(Value::as_bool).unwrap_or(false);
            let skip = match def.config.get("skip") {
                None => Vec::new(),
                Some(v) => serde_json::from_value(v.clone())?,
            };
            Ok(Box::new(PassThroughTask {
                fail: flag("fail"),
                no_work: flag("no_work"),
                skip,
            }) as Box<dyn PipelineTask>)
        })
}
