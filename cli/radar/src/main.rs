//! Agentic Radar CLI: thin, blocking-entry-point wrapper around
//! `radar-core` / `radar-store` / `radar-evidence`. Argument parsing and
//! interactive output are explicitly outside the core engine's scope; this
//! binary is the external collaborator that drives it.

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use radar_core::model::Severity;
use radar_core::orchestrator::{ScanConfig, TestConfig};
use radar_evidence::EvidencePackBuilder;
use radar_store::{LocalObjectStore, ObjectStore};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "radar")]
#[command(about = "Security radar for agentic applications")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the static detector pipeline against a project
    Scan {
        /// Project root to scan (defaults to the current directory)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,

        /// Path the JSON report is written to
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Directory-backed object store the report is additionally copied into
        #[arg(long = "object-store", value_name = "DIR")]
        object_store: Option<PathBuf>,

        /// Trace identifier to attach to the report (repeatable)
        #[arg(long = "trace-id", value_name = "ID")]
        trace_id: Vec<String>,

        /// Metadata label in `K=V` form (repeatable, last write wins)
        #[arg(long = "label", value_name = "K=V")]
        label: Vec<String>,

        /// Omit the parsed-project snapshot from the sealed report
        #[arg(long = "no-project-snapshot")]
        no_project_snapshot: bool,
    },

    /// Run the detector pipeline plus the adversarial scenario runner
    Test {
        /// Project root to scan (defaults to the current directory)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,

        /// Path the JSON report is written to
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Directory-backed object store the report is additionally copied into
        #[arg(long = "object-store", value_name = "DIR")]
        object_store: Option<PathBuf>,

        /// Trace identifier to attach to the report (repeatable)
        #[arg(long = "trace-id", value_name = "ID")]
        trace_id: Vec<String>,

        /// Metadata label in `K=V` form (repeatable, last write wins)
        #[arg(long = "label", value_name = "K=V")]
        label: Vec<String>,

        /// Omit the parsed-project snapshot from the sealed report
        #[arg(long = "no-project-snapshot")]
        no_project_snapshot: bool,

        /// Scenario to evaluate (repeatable); defaults to the runner's own set
        #[arg(long = "scenario", value_name = "NAME")]
        scenario: Vec<String>,
    },

    /// Build an evidence pack from already-written artifacts
    Evidence {
        #[command(subcommand)]
        command: EvidenceCommands,
    },
}

#[derive(Subcommand)]
enum EvidenceCommands {
    /// Bundle findings files and optional logs into a deterministic zip
    Pack {
        /// Findings file to include (repeatable, at least one required)
        #[arg(long = "findings", value_name = "PATH", required = true)]
        findings: Vec<PathBuf>,

        /// Directory or single file of logs to bundle alongside the findings
        #[arg(long = "logs", value_name = "PATH")]
        logs: Option<PathBuf>,

        /// Trace identifier to record in the pack metadata (repeatable)
        #[arg(long = "trace-id", value_name = "ID")]
        trace_id: Vec<String>,

        /// Path the zip archive is written to
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Directory-backed object store the archive is additionally copied into
        #[arg(long = "object-store", value_name = "DIR")]
        object_store: Option<PathBuf>,
    },
}

/// Parse `K=V` metadata labels into a JSON object. Duplicate keys are
/// last-write-wins, matching spec.md §6.
fn parse_labels(labels: Vec<String>) -> anyhow::Result<Map<String, Value>> {
    let mut metadata = Map::new();
    for raw in labels {
        let (key, value) = raw.split_once('=').ok_or_else(|| {
            anyhow::anyhow!("invalid label '{raw}': expected 'KEY=VALUE'")
        })?;
        if key.is_empty() {
            anyhow::bail!("invalid label '{raw}': key must not be empty");
        }
        metadata.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(metadata)
}

fn severity_style(severity: &Severity) -> console::Style {
    match severity {
        Severity::Critical => console::Style::new().red().bold(),
        Severity::High => console::Style::new().red(),
        Severity::Medium => console::Style::new().yellow(),
        Severity::Low => console::Style::new().cyan(),
        Severity::Info => console::Style::new().blue(),
        Severity::Unknown => console::Style::new().dim(),
    }
}

fn print_summary(report: &radar_core::model::RadarReport, output_path: &PathBuf, stored: Option<&PathBuf>) {
    println!();
    println!(
        "{}",
        style(format!("Agentic Radar {} report: {}", report.mode, report.project_name)).bold()
    );
    println!(
        "  {} findings across {} tools, {} MCP servers, {} dependencies",
        report.summary.findings.total,
        report.summary.inventory.tools,
        report.summary.inventory.mcp_servers,
        report.summary.inventory.dependencies,
    );
    for sev in ["critical", "high", "medium", "low", "info", "unknown"] {
        let count = report.summary.findings.by_severity.get(sev).copied().unwrap_or(0);
        if count == 0 {
            continue;
        }
        let severity = Severity::normalize(sev);
        println!("  {} {}", style(count).bold(), severity_style(&severity).apply_to(sev));
    }
    if !report.scenario_results.is_empty() {
        println!("  scenarios:");
        for result in &report.scenario_results {
            println!("    {} - {}", result.name, result.status);
        }
    }
    println!("  wrote {}", output_path.display());
    if let Some(stored) = stored {
        println!("  stored at {}", stored.display());
    }
}

async fn run_scan(
    path: Option<PathBuf>,
    output: Option<PathBuf>,
    object_store: Option<PathBuf>,
    trace_id: Vec<String>,
    label: Vec<String>,
    no_project_snapshot: bool,
) -> anyhow::Result<()> {
    let metadata = parse_labels(label)?;
    let root = path.unwrap_or_else(|| PathBuf::from("."));
    let output_path = output.unwrap_or_else(|| PathBuf::from("agentic-radar-report.json"));

    let pb = spinner("running detectors...");
    let mut config = ScanConfig::new(root, output_path)
        .with_trace_ids(trace_id)
        .with_metadata(metadata);
    if let Some(store) = object_store {
        config = config.with_object_store_path(store);
    }
    if no_project_snapshot {
        config = config.without_project_snapshot();
    }

    let result = radar_core::orchestrator::run_scan(config).await?;
    pb.finish_and_clear();

    print_summary(&result.report, &result.output_path, result.stored_artifact.as_ref());
    Ok(())
}

async fn run_test(
    path: Option<PathBuf>,
    output: Option<PathBuf>,
    object_store: Option<PathBuf>,
    trace_id: Vec<String>,
    label: Vec<String>,
    no_project_snapshot: bool,
    scenario: Vec<String>,
) -> anyhow::Result<()> {
    let metadata = parse_labels(label)?;
    let root = path.unwrap_or_else(|| PathBuf::from("."));
    let output_path = output.unwrap_or_else(|| PathBuf::from("agentic-radar-test-report.json"));

    let pb = spinner("running detectors and scenarios...");
    let mut scan_config = ScanConfig::new(root, output_path)
        .with_trace_ids(trace_id)
        .with_metadata(metadata);
    if let Some(store) = object_store {
        scan_config = scan_config.with_object_store_path(store);
    }
    if no_project_snapshot {
        scan_config = scan_config.without_project_snapshot();
    }
    let config = TestConfig::from_scan_config(scan_config).with_scenarios(scenario);

    let result = radar_core::orchestrator::run_test(config).await?;
    pb.finish_and_clear();

    print_summary(&result.report, &result.output_path, result.stored_artifact.as_ref());
    Ok(())
}

async fn run_evidence_pack(
    findings: Vec<PathBuf>,
    logs: Option<PathBuf>,
    trace_id: Vec<String>,
    output: Option<PathBuf>,
    object_store: Option<PathBuf>,
) -> anyhow::Result<()> {
    let store = object_store.map(LocalObjectStore::new).transpose()?;
    let builder = match &store {
        Some(store) => EvidencePackBuilder::new().with_object_store(store as &dyn ObjectStore),
        None => EvidencePackBuilder::new(),
    };

    let output = output.or_else(|| Some(PathBuf::from("evidence-pack.zip")));
    let result = builder.build(&findings, logs.as_deref(), trace_id, output)?;

    println!();
    println!("{}", style("Agentic Radar evidence pack").bold());
    println!("  {} findings file(s), {} log file(s)", result.metadata.findings.len(), result.metadata.logs.len());
    println!("  wrote {}", result.pack_path.display());
    if let Some(stored) = &result.stored_path {
        println!("  stored at {}", stored.display());
    }
    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Scan { path, output, object_store, trace_id, label, no_project_snapshot } => {
            run_scan(path, output, object_store, trace_id, label, no_project_snapshot).await
        }
        Commands::Test { path, output, object_store, trace_id, label, no_project_snapshot, scenario } => {
            run_test(path, output, object_store, trace_id, label, no_project_snapshot, scenario).await
        }
        Commands::Evidence { command } => match command {
            EvidenceCommands::Pack { findings, logs, trace_id, output, object_store } => {
                run_evidence_pack(findings, logs, trace_id, output, object_store).await
            }
        },
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_k_equals_v() {
        let metadata = parse_labels(vec!["team=radar".to_string(), "env=prod".to_string()]).unwrap();
        assert_eq!(metadata.get("team").and_then(Value::as_str), Some("radar"));
        assert_eq!(metadata.get("env").and_then(Value::as_str), Some("prod"));
    }

    #[test]
    fn duplicate_label_keys_last_write_wins() {
        let metadata = parse_labels(vec!["team=radar".to_string(), "team=security".to_string()]).unwrap();
        assert_eq!(metadata.get("team").and_then(Value::as_str), Some("security"));
        assert_eq!(metadata.len(), 1);
    }

    #[test]
    fn malformed_label_is_rejected() {
        let err = parse_labels(vec!["no-equals-sign".to_string()]).unwrap_err();
        assert!(err.to_string().contains("invalid label"));
    }
}
