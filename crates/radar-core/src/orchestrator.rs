//! Top-level entry points: parse a project, fan detectors out, (optionally)
//! run the scenario runner, build the report, and write artifacts to disk.
//! Both entry points are `async fn` but block the caller until every
//! artifact is on disk — no fire-and-forget, per the concurrency model.

use crate::detectors::{default_detectors, detector_error_finding, Detector};
use crate::error::{RadarError, Result};
use crate::model::{ParsedProject, RadarReport, RunMode};
use crate::parser::ProjectParser;
use crate::report::ReportBuilder;
use crate::scenario::ScenarioRunner;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Cooperative cancellation signal accepted by [`run_scan`] / [`run_test`].
/// The orchestrator checks it after the in-flight detector fan-out
/// completes and before any artifact is written; a cancelled run returns
/// [`RadarError::Cancelled`] with nothing written to disk.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Build a fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configuration for a radar scan run.
pub struct ScanConfig {
    /// Project root to scan
    pub root: PathBuf,
    /// Path the JSON report is written to
    pub output_path: PathBuf,
    /// Optional directory-backed object store the report is additionally copied into
    pub object_store_path: Option<PathBuf>,
    /// Trace identifiers to attach to the report
    pub trace_ids: Vec<String>,
    /// Caller-supplied metadata, shallow-merged into the report's metadata
    pub metadata: Map<String, Value>,
    /// Whether to embed the parsed project snapshot in the sealed report
    pub include_project_snapshot: bool,
    /// Parser used to load the project; defaults to [`ProjectParser::new`]
    pub parser: Option<ProjectParser>,
    /// Detector pipeline; defaults to [`default_detectors`]
    pub detectors: Option<Vec<Box<dyn Detector>>>,
    /// Optional cooperative cancellation signal
    pub cancellation: Option<CancellationToken>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            output_path: PathBuf::from("agentic-radar-report.json"),
            object_store_path: None,
            trace_ids: Vec::new(),
            metadata: Map::new(),
            include_project_snapshot: true,
            parser: None,
            detectors: None,
            cancellation: None,
        }
    }
}

impl ScanConfig {
    /// Build a config scanning `root`, writing to `output_path`.
    pub fn new(root: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_path: output_path.into(),
            ..Self::default()
        }
    }

    /// Attach an object store path the report is additionally copied into.
    pub fn with_object_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.object_store_path = Some(path.into());
        self
    }

    /// Attach trace identifiers to the run.
    pub fn with_trace_ids(mut self, trace_ids: Vec<String>) -> Self {
        self.trace_ids = trace_ids;
        self
    }

    /// Merge caller-supplied metadata labels into the report.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Skip embedding the project snapshot in the sealed report.
    pub fn without_project_snapshot(mut self) -> Self {
        self.include_project_snapshot = false;
        self
    }

    /// Override the detector pipeline.
    pub fn with_detectors(mut self, detectors: Vec<Box<dyn Detector>>) -> Self {
        self.detectors = Some(detectors);
        self
    }

    /// Attach a cooperative cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Configuration for a radar test run: a [`ScanConfig`] plus the scenario
/// set to evaluate.
pub struct TestConfig {
    /// The underlying scan configuration
    pub scan: ScanConfig,
    /// Scenarios to evaluate; defaults to [`crate::scenario::DEFAULT_SCENARIOS`] when empty
    pub scenarios: Vec<String>,
}

impl TestConfig {
    /// Build a test config scanning `root`, writing to `output_path`.
    pub fn new(root: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            scan: ScanConfig::new(root, output_path),
            scenarios: Vec::new(),
        }
    }

    /// Wrap an existing [`ScanConfig`].
    pub fn from_scan_config(scan: ScanConfig) -> Self {
        Self { scan, scenarios: Vec::new() }
    }

    /// Override the scenario set to evaluate.
    pub fn with_scenarios(mut self, scenarios: Vec<String>) -> Self {
        self.scenarios = scenarios;
        self
    }
}

/// Result of a radar scan run.
pub struct ScanResult {
    /// The sealed report
    pub report: RadarReport,
    /// Path the report was written to
    pub output_path: PathBuf,
    /// Path the report was additionally copied to, if an object store was configured
    pub stored_artifact: Option<PathBuf>,
}

/// Result of a radar test run.
pub struct TestResult {
    /// The sealed report (scan findings + scenario findings)
    pub report: RadarReport,
    /// Path the report was written to
    pub output_path: PathBuf,
    /// Path the report was additionally copied to, if an object store was configured
    pub stored_artifact: Option<PathBuf>,
    /// Per-scenario outcomes
    pub scenario_results: Vec<crate::model::ScenarioResult>,
}

fn resolve_detectors(detectors: Option<Vec<Box<dyn Detector>>>) -> Vec<Box<dyn Detector>> {
    detectors.unwrap_or_else(default_detectors)
}

/// Run the detector pipeline against `project`. When more than one detector
/// is registered they are fanned out concurrently via
/// [`tokio::task::JoinSet`] (each detector is synchronous, so it runs on a
/// blocking-pool thread); results are spliced back into registration order
/// before returning, preserving the ordering guarantee regardless of
/// concurrent execution.
#[instrument(skip(project, detectors))]
async fn run_detector_pipeline(
    project: Arc<ParsedProject>,
    detectors: Vec<Box<dyn Detector>>,
) -> Vec<crate::model::RadarFinding> {
    if detectors.len() <= 1 {
        return crate::detectors::run_detectors(&project, &detectors);
    }

    let mut join_set = tokio::task::JoinSet::new();
    for (index, detector) in detectors.into_iter().enumerate() {
        let project = Arc::clone(&project);
        join_set.spawn_blocking(move || {
            let name = detector.name().to_string();
            let result = detector.run(&project);
            (index, name, result)
        });
    }

    let mut indexed = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, _name, Ok(findings))) => indexed.push((index, findings)),
            Ok((index, name, Err(err))) => {
                indexed.push((index, vec![detector_error_finding(&name, &err.message)]))
            }
            Err(join_err) => {
                warn!("detector task did not complete: {join_err}");
            }
        }
    }
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().flat_map(|(_, findings)| findings).collect()
}

fn parse_project(root: &PathBuf, parser: &Option<ProjectParser>) -> Result<ParsedProject> {
    match parser {
        Some(parser) => parser.parse(root),
        None => ProjectParser::new().parse(root),
    }
}

fn write_and_store(report: &RadarReport, config: &ScanConfig) -> Result<Option<PathBuf>> {
    report.write_json(&config.output_path)?;
    match &config.object_store_path {
        None => Ok(None),
        Some(store_path) => {
            let store = radar_store::LocalObjectStore::new(store_path)?;
            let name = config.output_path.file_name().and_then(|n| n.to_str());
            let stored = radar_store::ObjectStore::put_file(&store, &config.output_path, name)?;
            Ok(Some(stored))
        }
    }
}

/// Run a static detector scan end to end: parse the project, fan detectors
/// out, seal and write the report, optionally copy it into an object
/// store. Returns only once every artifact is on disk.
#[instrument(skip(config))]
pub async fn run_scan(config: ScanConfig) -> Result<ScanResult> {
    let project = parse_project(&config.root, &config.parser)?;
    let detectors = resolve_detectors(config.detectors);
    let detector_names: Vec<String> = detectors.iter().map(|d| d.name().to_string()).collect();

    let project = Arc::new(project);
    let findings = run_detector_pipeline(Arc::clone(&project), detectors).await;

    if config.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
        return Err(RadarError::Cancelled);
    }

    let mut metadata = config.metadata.clone();
    metadata.entry("mode").or_insert_with(|| Value::String("scan".to_string()));
    metadata
        .entry("detectors")
        .or_insert_with(|| Value::Array(detector_names.into_iter().map(Value::String).collect()));
    metadata
        .entry("trace_id_count")
        .or_insert_with(|| Value::Number(config.trace_ids.len().into()));

    let builder = ReportBuilder::new(config.include_project_snapshot);
    let report = builder.build(&project, findings, RunMode::Scan, config.trace_ids.clone(), vec![], metadata);

    let stored_artifact = write_and_store(&report, &config)?;
    info!(findings = report.findings.len(), "scan complete");

    Ok(ScanResult {
        report,
        output_path: config.output_path.clone(),
        stored_artifact,
    })
}

/// Run a scan plus the scenario runner: parse, fan detectors out, run
/// scenarios, merge findings (detectors first), seal and write the report.
#[instrument(skip(config))]
pub async fn run_test(config: TestConfig) -> Result<TestResult> {
    let TestConfig { scan: scan_config, scenarios } = config;

    let project = parse_project(&scan_config.root, &scan_config.parser)?;
    let detectors = resolve_detectors(scan_config.detectors);
    let mut detector_names: Vec<String> = detectors.iter().map(|d| d.name().to_string()).collect();
    detector_names.push("scenario-runner".to_string());

    let project = Arc::new(project);
    let detector_findings = run_detector_pipeline(Arc::clone(&project), detectors).await;

    if scan_config.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
        return Err(RadarError::Cancelled);
    }

    let scenario_runner = ScenarioRunner::default();
    let scenario_names: Vec<String> = if scenarios.is_empty() {
        scenario_runner.scenarios().to_vec()
    } else {
        scenarios
    };
    let (scenario_findings, scenario_results) = scenario_runner.run(&project, Some(&scenario_names));

    let mut all_findings = detector_findings;
    all_findings.extend(scenario_findings);

    let mut metadata = scan_config.metadata.clone();
    metadata.entry("mode").or_insert_with(|| Value::String("test".to_string()));
    metadata
        .entry("detectors")
        .or_insert_with(|| Value::Array(detector_names.into_iter().map(Value::String).collect()));
    metadata
        .entry("trace_id_count")
        .or_insert_with(|| Value::Number(scan_config.trace_ids.len().into()));
    metadata.insert(
        "scenarios".to_string(),
        Value::Array(scenario_names.into_iter().map(Value::String).collect()),
    );
    let scenario_failures: Vec<Value> = scenario_results
        .iter()
        .filter(|r| r.status == crate::model::ScenarioStatus::Failed)
        .map(|r| Value::String(r.name.clone()))
        .collect();
    metadata.insert("scenario_failures".to_string(), Value::Array(scenario_failures));

    let builder = ReportBuilder::new(scan_config.include_project_snapshot);
    let report = builder.build(
        &project,
        all_findings,
        RunMode::Test,
        scan_config.trace_ids.clone(),
        scenario_results.clone(),
        metadata,
    );

    let stored_artifact = write_and_store(&report, &scan_config)?;
    info!(
        findings = report.findings.len(),
        scenarios = scenario_results.len(),
        "test run complete"
    );

    Ok(TestResult {
        report,
        output_path: scan_config.output_path.clone(),
        stored_artifact,
        scenario_results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn scan_writes_report_with_expected_findings() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("agentic_radar.json"),
            r#"{
                "project": "demo",
                "tools": [{"name": "search", "source": "https://example.com/t"}, {"name": "email", "version": "1.2.3", "source": "internal"}]
            }"#,
        )
        .unwrap();

        let output_path = dir.path().join("report.json");
        let config = ScanConfig::new(dir.path(), &output_path);
        let result = run_scan(config).await.unwrap();

        assert!(output_path.exists());
        assert_eq!(result.report.mode, RunMode::Scan);
        let ids: Vec<&str> = result.report.findings.iter().map(|f| f.identifier.as_str()).collect();
        assert!(ids.contains(&"TOOL-NOVERSION::search"));
        assert!(ids.contains(&"TOOL-EXTERNAL::search"));
        assert!(!ids.iter().any(|id| id.contains("email")));
        assert_eq!(
            result.report.summary.findings.total,
            result.report.findings.len()
        );
    }

    #[tokio::test]
    async fn test_run_records_scenario_failures_in_metadata() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("agentic_radar.json"),
            r#"{
                "project": "demo",
                "metadata": {"test_expectations": {"prompt-injection": "fail", "pii-leakage": "pass"}}
            }"#,
        )
        .unwrap();

        let output_path = dir.path().join("test-report.json");
        let config = TestConfig::new(dir.path(), &output_path)
            .with_scenarios(vec!["prompt-injection".to_string(), "pii-leakage".to_string()]);
        let result = run_test(config).await.unwrap();

        assert_eq!(result.scenario_results.len(), 2);
        let failures = result.report.metadata.get("scenario_failures").unwrap().as_array().unwrap();
        assert_eq!(failures, &vec![Value::String("prompt-injection".to_string())]);
        assert!(result.report.summary.findings.by_severity["high"] >= 1);
    }

    #[tokio::test]
    async fn cancelled_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("agentic_radar.json"), r#"{"project": "demo"}"#).unwrap();

        let output_path = dir.path().join("report.json");
        let token = CancellationToken::new();
        token.cancel();
        let config = ScanConfig::new(dir.path(), &output_path).with_cancellation(token);
        let err = run_scan(config).await.unwrap_err();
        assert!(matches!(err, RadarError::Cancelled));
        assert!(!output_path.exists());
    }
}
