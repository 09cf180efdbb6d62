use quanta_core::QuantumSuccessCaveats;
use quanta_provenance::{cli, AttemptOutcome, ProvenanceSnapshot, QuantumProvenanceGraph, Summary};
use quanta_test_utils::{chain_graph, quantum_of};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_snapshot(dir: &TempDir, name: &str, snapshot: &ProvenanceSnapshot) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, serde_json::to_string(snapshot).unwrap()).unwrap();
    path
}

fn sample_snapshot() -> ProvenanceSnapshot {
    let (graph, _) = chain_graph(["PassThrough"; 3], &[(1, 1), (1, 2)]);
    let pg = QuantumProvenanceGraph::new(&graph);
    let isr: Vec<_> = graph.quanta_for_task("isr").map(|q| q.id).collect();
    pg.ingest(isr[0], 1, AttemptOutcome::succeeded_with(QuantumSuccessCaveats::NO_WORK_FOUND))
        .unwrap();
    pg.ingest(isr[1], 1, AttemptOutcome::failed("boom")).unwrap();
    pg.ingest(quantum_of(&graph, "summarize").id, 1, AttemptOutcome::running()).unwrap();
    pg.snapshot()
}

fn run(args: &[&str]) -> anyhow::Result<String> {
    let mut out = Vec::new();
    cli::run_from(args.iter().copied(), &mut out)?;
    Ok(String::from_utf8(out).unwrap())
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn report_json_round_trips_through_summary() {
    let dir = TempDir::new().unwrap();
    let path = write_snapshot(&dir, "snapshot.json", &sample_snapshot());

    let text = run(&["quanta", "report", "--snapshot", path_str(&path), "--json"]).unwrap();
    let summary: Summary = serde_json::from_str(&text).unwrap();

    assert!(!summary.v2);
    assert_eq!(summary.tasks["isr"].n_successful, 1);
    assert_eq!(summary.tasks["isr"].n_failed, 1);
    assert_eq!(summary.tasks["summarize"].n_running, 1);
}

#[test]
fn report_v2_table_shows_caveat_codes() {
    let dir = TempDir::new().unwrap();
    let path = write_snapshot(&dir, "snapshot.json", &sample_snapshot());

    let table = run(&["quanta", "report", "--snapshot", path_str(&path), "--v2"]).unwrap();
    assert!(table.contains("Caveated"));
    assert!(table.contains(&format!("{}(1)", QuantumSuccessCaveats::NO_WORK_FOUND.concise())));

    let v1 = run(&["quanta", "report", "--snapshot", path_str(&path)]).unwrap();
    assert!(!v1.contains("Caveated"));
}

#[test]
fn config_can_force_v2() {
    let dir = TempDir::new().unwrap();
    let path = write_snapshot(&dir, "snapshot.json", &sample_snapshot());
    let config = dir.path().join("quanta.toml");
    std::fs::write(&config, "force_v2 = true\n").unwrap();

    let text = run(&[
        "quanta",
        "--config",
        path_str(&config),
        "report",
        "--snapshot",
        path_str(&path),
        "--json",
    ])
    .unwrap();
    let summary: Summary = serde_json::from_str(&text).unwrap();
    assert!(summary.v2);
    assert_eq!(summary.tasks["isr"].n_succeeded_with_caveats, 1);
}

#[test]
fn aggregate_merges_summary_files() {
    let dir = TempDir::new().unwrap();
    let path = write_snapshot(&dir, "snapshot.json", &sample_snapshot());
    let text = run(&["quanta", "report", "--snapshot", path_str(&path), "--json", "--v2"]).unwrap();
    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");
    std::fs::write(&first, &text).unwrap();
    std::fs::write(&second, &text).unwrap();

    let merged = run(&["quanta", "aggregate", path_str(&first), path_str(&second), "--json"]).unwrap();
    let summary: Summary = serde_json::from_str(&merged).unwrap();

    assert!(summary.v2);
    assert_eq!(summary.tasks["isr"].n_expected, 4);
    assert_eq!(summary.tasks["isr"].n_failed, 2);
    assert_eq!(summary.tasks["isr"].caveats["NO_WORK_FOUND"], 2);
}

#[test]
fn validate_log_reports_entry_count() {
    let dir = TempDir::new().unwrap();
    let path = write_snapshot(&dir, "snapshot.json", &sample_snapshot());

    let out = run(&["quanta", "validate-log", "--snapshot", path_str(&path)]).unwrap();
    assert!(out.contains("Log integrity: VALID"));
    assert!(out.contains("Entries checked: 3"));
}

#[test]
fn tampered_log_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut snapshot = sample_snapshot();
    snapshot.log[0].attempt = 9;
    let path = write_snapshot(&dir, "snapshot.json", &snapshot);

    assert!(run(&["quanta", "validate-log", "--snapshot", path_str(&path)]).is_err());
    assert!(run(&["quanta", "report", "--snapshot", path_str(&path)]).is_err());
}

#[test]
fn history_disagreeing_with_the_log_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut snapshot = sample_snapshot();
    let failed = snapshot
        .quanta
        .iter_mut()
        .flat_map(|q| q.history.attempts.values_mut())
        .find(|r| r.outcome.error.is_some())
        .unwrap();
    failed.outcome = AttemptOutcome::succeeded();
    let path = write_snapshot(&dir, "snapshot.json", &snapshot);

    let err = run(&["quanta", "validate-log", "--snapshot", path_str(&path)]).unwrap_err();
    assert!(err.to_string().contains("does not match the ingestion log"), "{err}");
}

#[test]
fn missing_subcommand_is_an_error() {
    assert!(run(&["quanta"]).is_err());
}
