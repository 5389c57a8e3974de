//! Report builder: aggregates a parsed project, its findings and scenario
//! outcomes into a sealed [`RadarReport`], and serializes it to disk.

use crate::error::Result;
use crate::model::{
    FindingsSummary, InventorySummary, ParsedProject, RadarFinding, RadarReport, ReportSummary,
    RunMode, ScenarioResult,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, instrument};

/// Builds [`RadarReport`]s from a parsed project and its findings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportBuilder {
    include_project_snapshot: bool,
}

impl ReportBuilder {
    /// Build a report builder; `include_project_snapshot` controls whether
    /// the sealed report embeds the full [`ParsedProject`] or omits it.
    pub fn new(include_project_snapshot: bool) -> Self {
        Self { include_project_snapshot }
    }

    /// Seal a [`RadarReport`] from a project, its findings, and (for `test`
    /// runs) scenario outcomes. Duplicate finding identifiers are collapsed,
    /// last-write-wins on metadata, keeping first-seen order.
    #[instrument(skip(self, project, findings, scenario_results, metadata))]
    pub fn build(
        &self,
        project: &ParsedProject,
        findings: Vec<RadarFinding>,
        mode: RunMode,
        trace_ids: Vec<String>,
        scenario_results: Vec<ScenarioResult>,
        metadata: Map<String, Value>,
    ) -> RadarReport {
        let findings = dedup_findings(findings);
        let summary = ReportSummary {
            findings: FindingsSummary::from_findings(&findings),
            inventory: InventorySummary {
                agents: project.agents.len(),
                tools: project.tools.len(),
                mcp_servers: project.mcp_servers.len(),
                dependencies: project.dependencies.len(),
            },
            mode: mode.to_string(),
        };

        RadarReport {
            project_name: project.project_name.clone(),
            mode,
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            findings,
            parsed_project: if self.include_project_snapshot { Some(project.clone()) } else { None },
            summary,
            trace_ids,
            scenario_results,
            metadata,
        }
    }
}

/// Collapse findings sharing an identifier, keeping first-seen order and
/// last-write-wins metadata/fields.
fn dedup_findings(findings: Vec<RadarFinding>) -> Vec<RadarFinding> {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: std::collections::HashMap<String, RadarFinding> = std::collections::HashMap::new();
    for finding in findings {
        let id = finding.identifier.clone();
        if !by_id.contains_key(&id) {
            order.push(id.clone());
        }
        by_id.insert(id, finding);
    }
    order.into_iter().filter_map(|id| by_id.remove(&id)).collect()
}

impl RadarReport {
    /// Serialize to UTF-8 JSON with two-space indentation, creating the
    /// parent directory if necessary.
    #[instrument(skip(self))]
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("wrote report to {}", path.display());
        Ok(())
    }

    /// Parse a report back from its JSON representation. Severities are
    /// re-normalized on the way in, matching the `from_dict(to_dict(R)) == R`
    /// round-trip invariant.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;
    use pretty_assertions::assert_eq;
    use serde_json::Map as JsonMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn empty_project() -> ParsedProject {
        ParsedProject {
            root: PathBuf::from("/tmp/demo"),
            project_name: "demo".into(),
            agents: vec![],
            tools: vec![],
            mcp_servers: vec![],
            dependencies: vec![],
            metadata: JsonMap::new(),
        }
    }

    #[test]
    fn summary_totals_match_finding_count() {
        let project = empty_project();
        let findings = vec![
            RadarFinding::new("A::1", "a", "high", "d", vec![], vec![], "det"),
            RadarFinding::new("A::2", "a", "high", "d", vec![], vec![], "det"),
            RadarFinding::new("A::3", "a", "low", "d", vec![], vec![], "det"),
        ];
        let report = ReportBuilder::new(true).build(
            &project,
            findings,
            RunMode::Scan,
            vec![],
            vec![],
            JsonMap::new(),
        );
        assert_eq!(report.summary.findings.total, 3);
        assert_eq!(report.summary.findings.by_severity["high"], 2);
        assert_eq!(report.summary.findings.by_severity["low"], 1);
        assert_eq!(report.findings.len(), 3);
    }

    #[test]
    fn duplicate_identifiers_collapse_last_write_wins() {
        let project = empty_project();
        let first = RadarFinding::new("DUP::1", "first", "low", "d", vec![], vec![], "det");
        let second = RadarFinding::new("DUP::1", "second", "high", "d", vec![], vec![], "det");
        let report = ReportBuilder::new(false).build(
            &project,
            vec![first, second],
            RunMode::Scan,
            vec![],
            vec![],
            JsonMap::new(),
        );
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].title, "second");
        assert!(matches!(report.findings[0].severity, Severity::High));
    }

    #[test]
    fn snapshot_omitted_when_not_requested() {
        let project = empty_project();
        let report = ReportBuilder::new(false).build(
            &project,
            vec![],
            RunMode::Scan,
            vec![],
            vec![],
            JsonMap::new(),
        );
        assert!(report.parsed_project.is_none());
    }

    #[test]
    fn write_json_then_round_trips_through_serde() {
        let dir = TempDir::new().unwrap();
        let project = empty_project();
        let report = ReportBuilder::new(true).build(
            &project,
            vec![RadarFinding::new("A::1", "a", "HIGH", "d", vec!["LLM02".into()], vec![], "det")],
            RunMode::Scan,
            vec!["trace-1".into()],
            vec![],
            JsonMap::new(),
        );
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let round_tripped = RadarReport::from_json_str(&text).unwrap();
        assert_eq!(round_tripped.project_name, report.project_name);
        assert_eq!(round_tripped.findings.len(), report.findings.len());
        assert!(matches!(round_tripped.findings[0].severity, Severity::High));
        assert_eq!(round_tripped.summary.findings.total, report.summary.findings.total);
    }
}
