use pretty_assertions::assert_eq;
use quanta_core::{QuantumId, QuantumSuccessCaveats};
use quanta_exec::prelude::*;
use quanta_provenance::prelude::*;
use quanta_test_utils::*;
use rayon::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;

fn ids_of(graph: &quanta_core::QuantumGraph, task: &str) -> Vec<QuantumId> {
    graph.quanta_for_task(task).map(|q| q.id).collect()
}

#[test]
fn failed_pass_blocks_downstream_with_root_cause() {
    let mut tasks = chain_tasks(["PassThrough"; 3]);
    tasks[0] = tasks[0].clone().with_config(json!({"fail": true}));
    let store = seeded_store([stored("raw", visit_detector(1, 1), 10)]);
    let graph = build_graph(tasks, &store);
    let executor = QuantumExecutor::new(store.clone(), Arc::new(fixture_registry()));

    let reports = executor.execute_graph(&graph, ExecutionMode::Batch).unwrap();
    let pg = QuantumProvenanceGraph::new(&graph);
    pg.ingest_reports(1, &reports).unwrap();

    let isr = quantum_of(&graph, "isr").id;
    let summary = pg.report(false);
    assert_eq!(summary.tasks["isr"].n_failed, 1);
    assert_eq!(summary.tasks["isr"].failed_quanta, vec![isr]);
    assert_eq!(summary.tasks["calibrate"].n_blocked, 1);
    assert_eq!(summary.tasks["summarize"].n_blocked, 1);
    for q in summary.quanta_with_status(QuantumStatus::Blocked) {
        assert_eq!(q.blocked_by, vec![isr]);
    }
    assert_eq!(summary.datasets["calexp"].n_missing, 1);
    assert!(pg.log().verify_integrity().is_ok());
}

#[test]
fn blocked_chain_is_attributed_past_the_blocked_quantum() {
    let (graph, _) = chain_graph(["PassThrough"; 3], &[(1, 1)]);
    let a = quantum_of(&graph, "isr").id;
    let b = quantum_of(&graph, "calibrate").id;
    let c = quantum_of(&graph, "summarize").id;
    let pg = QuantumProvenanceGraph::new(&graph);

    pg.ingest(a, 1, AttemptOutcome::failed("boom")).unwrap();
    assert_eq!(pg.ingest(b, 2, AttemptOutcome::running()).unwrap(), IngestResult::Recorded(QuantumStatus::Blocked));
    pg.ingest(c, 2, AttemptOutcome::succeeded()).unwrap();

    assert_eq!(pg.status(b).unwrap(), QuantumStatus::Blocked);
    assert_eq!(pg.status(c).unwrap(), QuantumStatus::Blocked);
    assert_eq!(pg.blocked_by(c).unwrap(), BTreeSet::from([a]));

    let summary = pg.report(true);
    let c_summary = summary.quanta.iter().find(|q| q.id == c).unwrap();
    assert_eq!(c_summary.blocked_by, vec![a]);
    assert_eq!(c_summary.attempts.len(), 1);
}

#[test]
fn caveats_are_folded_in_v1_and_broken_out_in_v2() {
    let (graph, _) = chain_graph(["PassThrough"; 3], &[(1, 1), (1, 2), (2, 1)]);
    let isr = ids_of(&graph, "isr");
    let pg = QuantumProvenanceGraph::new(&graph);
    pg.ingest(isr[0], 1, AttemptOutcome::succeeded_with(QuantumSuccessCaveats::NO_WORK_FOUND))
        .unwrap();
    pg.ingest(isr[1], 1, AttemptOutcome::succeeded()).unwrap();
    pg.ingest(
        isr[2],
        1,
        AttemptOutcome::succeeded_with(QuantumSuccessCaveats::NO_WORK_FOUND | QuantumSuccessCaveats::ALL_OUTPUTS_MISSING),
    )
    .unwrap();

    let v1 = pg.report(false).tasks["isr"].clone();
    assert_eq!(v1.n_expected, 3);
    assert_eq!(v1.n_successful, 3);
    assert_eq!(v1.n_succeeded_with_caveats, 0);
    assert!(v1.caveats.is_empty());

    let v2 = pg.report(true).tasks["isr"].clone();
    assert_eq!(v2.n_successful, 1);
    assert_eq!(v2.n_succeeded_with_caveats, 2);
    assert_eq!(v2.caveats["NO_WORK_FOUND"], 2);
    assert_eq!(v2.caveats["ALL_OUTPUTS_MISSING"], 1);
}

#[test]
fn metadata_slot_drives_ingestion() {
    let mut tasks = chain_tasks(["PassThrough"; 3]);
    tasks[0] = tasks[0].clone().with_config(json!({"no_work": true}));
    let store = seeded_store([stored("raw", visit_detector(1, 1), 10)]);
    let graph = build_graph(tasks, &store);
    let executor = QuantumExecutor::new(store.clone(), Arc::new(fixture_registry()));
    let isr = quantum_of(&graph, "isr");
    executor.execute(&graph, isr.id, ExecutionMode::Batch).unwrap();

    let metadata_ref = isr.outputs.iter().find(|r| r.dataset_type == "isr_metadata").unwrap();
    let metadata = TaskMetadata::from_value(store.get(metadata_ref).unwrap().value).unwrap();

    let pg = QuantumProvenanceGraph::new(&graph);
    pg.ingest_metadata(isr.id, 1, &metadata).unwrap();
    assert_eq!(pg.status(isr.id).unwrap(), QuantumStatus::SucceededWithCaveats);
    assert!(pg.state(isr.id).unwrap().caveats().contains(QuantumSuccessCaveats::NO_WORK_FOUND));
}

#[test]
fn successful_pass_produces_every_dataset() {
    let (graph, store) = chain_graph(["PassThrough"; 3], &[(1, 1), (1, 2)]);
    let executor = QuantumExecutor::new(store, Arc::new(fixture_registry()));
    let reports = executor.execute_graph(&graph, ExecutionMode::Batch).unwrap();

    let pg = QuantumProvenanceGraph::new(&graph);
    pg.ingest_reports(1, &reports).unwrap();
    // same pass again changes nothing
    pg.ingest_reports(1, &reports).unwrap();
    assert_eq!(pg.log().len(), graph.len());

    let summary = pg.report(true);
    for (name, d) in &summary.datasets {
        assert_eq!(d.n_missing, 0, "{name}");
        assert_eq!(d.n_produced, d.n_expected, "{name}");
    }
    assert_eq!(summary.datasets["calexp"].n_expected, 2);
    assert_eq!(summary.tasks["summarize"].n_successful, 1);
}

#[test]
fn independent_quanta_ingest_concurrently() {
    let raws: Vec<(i64, i64)> = (1..=8).flat_map(|v| (1..=8).map(move |d| (v, d))).collect();
    let (graph, _) = chain_graph(["PassThrough"; 3], &raws);
    let isr = ids_of(&graph, "isr");
    assert_eq!(isr.len(), 64);
    let pg = QuantumProvenanceGraph::new(&graph);

    isr.par_iter().for_each(|id| {
        pg.ingest(*id, 1, AttemptOutcome::succeeded()).unwrap();
    });
    // the same attempt from several threads at once records once
    let calibrate = quantum_of(&graph, "calibrate").id;
    (0..16).into_par_iter().for_each(|_| {
        pg.ingest(calibrate, 1, AttemptOutcome::succeeded()).unwrap();
    });

    assert!(isr.iter().all(|id| pg.status(*id).unwrap() == QuantumStatus::Succeeded));
    assert_eq!(pg.history(calibrate).unwrap().attempts.len(), 1);
    assert_eq!(pg.log().len(), 65);
    assert!(pg.log().verify_integrity().is_ok());
}

#[test]
fn racing_attempts_of_one_quantum_keep_the_log_in_attempt_order() {
    let (graph, _) = chain_graph(["PassThrough"; 3], &[(1, 1)]);
    let isr = quantum_of(&graph, "isr").id;
    let pg = QuantumProvenanceGraph::new(&graph);

    (1..=32u32).into_par_iter().for_each(|attempt| {
        match pg.ingest(isr, attempt, AttemptOutcome::failed("retry")) {
            Ok(_) | Err(ProvenanceError::AttemptOutOfOrder { .. }) => {}
            Err(e) => panic!("unexpected error {e}"),
        }
    });

    let attempts: Vec<u32> = pg.log().entries().iter().map(|e| e.attempt).collect();
    assert!(attempts.windows(2).all(|w| w[0] < w[1]), "{attempts:?}");
    assert_eq!(attempts.len(), pg.history(isr).unwrap().attempts.len());
    assert!(QuantumProvenanceGraph::from_snapshot(pg.snapshot()).is_ok());
}

#[test]
fn downgraded_success_is_wonky_in_the_report() {
    let (graph, _) = chain_graph(["PassThrough"; 3], &[(1, 1)]);
    let isr = quantum_of(&graph, "isr").id;
    let pg = QuantumProvenanceGraph::new(&graph);
    pg.ingest(isr, 1, AttemptOutcome::succeeded()).unwrap();
    pg.ingest(isr, 2, AttemptOutcome::failed("outputs lost")).unwrap();

    let summary = pg.report(false);
    assert_eq!(summary.tasks["isr"].n_failed, 1);
    assert_eq!(summary.tasks["isr"].n_wonky, 1);
    assert_eq!(summary.tasks["calibrate"].n_not_run, 1);
}
