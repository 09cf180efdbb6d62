//! `quanta` command line
//!
//! - `report --snapshot FILE [--v2] [--json]`: summarize a saved provenance graph
//! - `aggregate FILE...  [--json]`: merge summaries written by `report --json`
//! - `validate-log --snapshot FILE`: check the ingestion log hash chain

use crate::config::ReportConfig;
use crate::graph::{ProvenanceSnapshot, QuantumProvenanceGraph};
use crate::report::Summary;
use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

#[must_use]
pub fn command() -> Command {
    let snapshot = Arg::new("snapshot")
        .long("snapshot")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Provenance snapshot (JSON)");
    let json = Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output as JSON");

    Command::new("quanta")
        .version(crate::VERSION)
        .about("Quantum provenance reports")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Report configuration (TOML)"),
        )
        .subcommand(
            Command::new("report")
                .about("Summarize a provenance snapshot")
                .arg(snapshot.clone())
                .arg(
                    Arg::new("v2")
                        .long("v2")
                        .action(ArgAction::SetTrue)
                        .help("Break caveated successes out of the success count"),
                )
                .arg(json.clone()),
        )
        .subcommand(
            Command::new("aggregate")
                .about("Merge several JSON summaries")
                .arg(
                    Arg::new("summaries")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(PathBuf))
                        .help("Summary files written by `report --json`"),
                )
                .arg(json),
        )
        .subcommand(
            Command::new("validate-log")
                .about("Verify the ingestion log of a snapshot")
                .arg(snapshot),
        )
}

/// Load the configuration named by `--config`, or the defaults.
///
/// # Errors
/// If the named file cannot be read or parsed.
pub fn load_config(matches: &ArgMatches) -> anyhow::Result<ReportConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => ReportConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(ReportConfig::default()),
    }
}

fn load_snapshot(path: &PathBuf) -> anyhow::Result<QuantumProvenanceGraph> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let snapshot: ProvenanceSnapshot =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(QuantumProvenanceGraph::from_snapshot(snapshot)?)
}

fn emit(out: &mut impl Write, summary: &Summary, json: bool) -> anyhow::Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(summary)?)?;
    } else {
        write!(out, "{}", summary.to_table())?;
    }
    Ok(())
}

/// Run parsed arguments, writing results to `out`.
///
/// # Errors
/// Unreadable inputs, invalid snapshots or a broken ingestion log.
pub fn run(matches: &ArgMatches, config: &ReportConfig, out: &mut impl Write) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("report", args)) => {
            let path = args.get_one::<PathBuf>("snapshot").context("missing --snapshot")?;
            let graph = load_snapshot(path)?;
            let v2 = args.get_flag("v2") || config.force_v2;
            let summary = graph.report(v2);
            tracing::info!(quanta = summary.quanta.len(), v2, "report generated");
            emit(out, &summary, args.get_flag("json"))
        }
        Some(("aggregate", args)) => {
            let mut summaries = Vec::new();
            for path in args.get_many::<PathBuf>("summaries").into_iter().flatten() {
                let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
                let summary: Summary =
                    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
                summaries.push(summary);
            }
            emit(out, &Summary::aggregate(&summaries), args.get_flag("json"))
        }
        Some(("validate-log", args)) => {
            let path = args.get_one::<PathBuf>("snapshot").context("missing --snapshot")?;
            let graph = load_snapshot(path)?;
            writeln!(out, "Log integrity: VALID")?;
            writeln!(out, "Entries checked: {}", graph.log().len())?;
            Ok(())
        }
        _ => anyhow::bail!("unknown command"),
    }
}

/// Parse `args` and run, with configuration from `--config`.
///
/// # Errors
/// Argument errors and anything [`run`] returns.
pub fn run_from<I, T>(args: I, out: &mut impl Write) -> anyhow::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = command().try_get_matches_from(args)?;
    let config = load_config(&matches)?;
    run(&matches, &config, out)
}
