//! Default detector pipeline: manifest-driven checks over a
//! [`ParsedProject`], each producing [`RadarFinding`]s directly from the
//! declared tool/MCP/dependency inventory. These are the detectors wired
//! into [`crate::orchestrator`] by default; the AST/config-level
//! [`crate::walker`] is a separate, opt-in capability.

use crate::error::DetectorError;
use crate::model::{ParsedProject, RadarFinding};
use serde_json::{Map, Value};

/// A single security check run against a [`ParsedProject`].
///
/// A detector must never panic on malformed input and should prefer
/// returning an empty finding set over an [`DetectorError`]; the error path
/// exists for genuinely unexpected failures (e.g. a detector that shells out)
/// and is converted by the orchestrator into a synthetic
/// `DETECTOR-ERROR::<name>` finding rather than aborting the run.
pub trait Detector: Send + Sync {
    /// Stable detector name, used as the `detector` field on every finding
    /// it emits and in the orchestrator's `detectors` metadata list.
    fn name(&self) -> &str;

    /// Run the detector against a parsed project.
    fn run(&self, project: &ParsedProject) -> Result<Vec<RadarFinding>, DetectorError>;
}

/// Checks tool inventory completeness: missing version pins and
/// externally-sourced tools.
#[derive(Debug, Default)]
pub struct ToolInventoryDetector;

impl Detector for ToolInventoryDetector {
    fn name(&self) -> &str {
        "tool-inventory"
    }

    fn run(&self, project: &ParsedProject) -> Result<Vec<RadarFinding>, DetectorError> {
        let mut findings = Vec::new();
        for tool in &project.tools {
            if tool.version.is_none() {
                let mut metadata = Map::new();
                metadata.insert(
                    "source".into(),
                    tool.source.clone().map(Value::String).unwrap_or(Value::Null),
                );
                findings.push(
                    RadarFinding::new(
                        format!("TOOL-NOVERSION::{}", tool.name),
                        format!("Tool '{}' is missing a pinned version", tool.name),
                        "medium",
                        "Tools should be version pinned to ensure deterministic security reviews and facilitate patch management.",
                        vec!["LLM02".to_string()],
                        vec!["Agentic-Tooling".to_string()],
                        self.name(),
                    )
                    .with_subject(tool.name.clone())
                    .with_remediation("Add an explicit version for the tool in the agent manifest.")
                    .with_metadata(metadata),
                );
            }

            if tool.source.as_deref().is_some_and(|s| s.starts_with("http")) {
                let mut metadata = Map::new();
                metadata.insert(
                    "source".into(),
                    tool.source.clone().map(Value::String).unwrap_or(Value::Null),
                );
                findings.push(
                    RadarFinding::new(
                        format!("TOOL-EXTERNAL::{}", tool.name),
                        format!("Tool '{}' is sourced from an external endpoint", tool.name),
                        "low",
                        "External tool sources should be evaluated for supply-chain exposure and guarded with allow-lists or sandboxes.",
                        vec!["LLM06".to_string()],
                        vec!["Agentic-External-Tool".to_string()],
                        self.name(),
                    )
                    .with_subject(tool.name.clone())
                    .with_remediation("Review the external tool source and enforce provenance controls.")
                    .with_metadata(metadata),
                );
            }
        }
        Ok(findings)
    }
}

/// Checks MCP server definitions for missing capability declarations and
/// weak/absent authentication.
#[derive(Debug, Default)]
pub struct MCPDetector;

impl Detector for MCPDetector {
    fn name(&self) -> &str {
        "mcp-server"
    }

    fn run(&self, project: &ParsedProject) -> Result<Vec<RadarFinding>, DetectorError> {
        let mut findings = Vec::new();
        for server in &project.mcp_servers {
            if server.capabilities.is_empty() {
                let mut metadata = Map::new();
                metadata.insert("endpoint".into(), Value::String(server.endpoint.clone()));
                findings.push(
                    RadarFinding::new(
                        format!("MCP-NOCAP::{}", server.name),
                        format!("MCP server '{}' does not declare capabilities", server.name),
                        "medium",
                        "Declare explicit MCP capabilities to apply least privilege controls and map permissions to security policies.",
                        vec!["LLM08".to_string()],
                        vec!["Agentic-MCP-LeastPrivilege".to_string()],
                        self.name(),
                    )
                    .with_subject(server.name.clone())
                    .with_remediation("Document the MCP server capabilities and enforce policy checks.")
                    .with_metadata(metadata),
                );
            }

            let weak_auth = matches!(server.auth_mode.as_deref(), None | Some("anonymous") | Some("none"));
            if weak_auth {
                let mut metadata = Map::new();
                metadata.insert("endpoint".into(), Value::String(server.endpoint.clone()));
                metadata.insert(
                    "auth_mode".into(),
                    server.auth_mode.clone().map(Value::String).unwrap_or(Value::Null),
                );
                findings.push(
                    RadarFinding::new(
                        format!("MCP-NOAUTH::{}", server.name),
                        format!("MCP server '{}' has no authentication configured", server.name),
                        "high",
                        "Unprotected MCP servers expose powerful automation capabilities. Use mutual authentication and scoped tokens.",
                        vec!["LLM04".to_string()],
                        vec!["Agentic-MCP-Hardening".to_string()],
                        self.name(),
                    )
                    .with_subject(server.name.clone())
                    .with_remediation("Require authentication and audit access for the MCP server.")
                    .with_metadata(metadata),
                );
            }
        }
        Ok(findings)
    }
}

/// Emits a finding per declared dependency vulnerability.
#[derive(Debug, Default)]
pub struct DependencyVulnerabilityDetector;

fn normalize_dependency_severity(raw: &str) -> &'static str {
    match raw.trim().to_lowercase().as_str() {
        "critical" => "critical",
        "high" => "high",
        "medium" | "moderate" => "medium",
        "low" => "low",
        _ => "unknown",
    }
}

impl Detector for DependencyVulnerabilityDetector {
    fn name(&self) -> &str {
        "dependency-vulnerability"
    }

    fn run(&self, project: &ParsedProject) -> Result<Vec<RadarFinding>, DetectorError> {
        let mut findings = Vec::new();
        for dependency in &project.dependencies {
            for vulnerability in &dependency.vulnerabilities {
                let raw_severity = if vulnerability.severity.is_empty() {
                    "unknown"
                } else {
                    vulnerability.severity.as_str()
                };
                let normalized = normalize_dependency_severity(raw_severity);
                let identifier = vulnerability
                    .identifier()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("VULN::{}", dependency.name));

                let mut metadata = Map::new();
                metadata.insert("id".into(), Value::String(identifier.clone()));
                metadata.insert("severity".into(), Value::String(raw_severity.to_lowercase()));
                metadata.insert(
                    "fix_version".into(),
                    vulnerability.fix_version.clone().map(Value::String).unwrap_or(Value::Null),
                );

                let description = vulnerability
                    .description
                    .clone()
                    .unwrap_or_else(|| "Dependency vulnerability reported by upstream advisory feeds.".to_string());

                let mut finding = RadarFinding::new(
                    format!("DEP-VULN::{}::{identifier}", dependency.name),
                    format!("Dependency '{}' has a known vulnerability", dependency.name),
                    normalized,
                    description,
                    vec!["LLM06".to_string()],
                    vec!["Agentic-SupplyChain".to_string()],
                    self.name(),
                )
                .with_subject(dependency.name.clone())
                .with_metadata(metadata);

                if let Some(fix_version) = &vulnerability.fix_version {
                    finding = finding.with_remediation(fix_version.clone());
                }

                findings.push(finding);
            }
        }
        Ok(findings)
    }
}

/// Build the default detector pipeline in registration order.
pub fn default_detectors() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(ToolInventoryDetector),
        Box::new(MCPDetector),
        Box::new(DependencyVulnerabilityDetector),
    ]
}

/// Synthesize the `DETECTOR-ERROR::<name>` finding the orchestrator emits in
/// place of aborting a run when a detector fails.
pub fn detector_error_finding(name: &str, message: &str) -> RadarFinding {
    RadarFinding::new(
        format!("DETECTOR-ERROR::{name}"),
        format!("Detector '{name}' failed to run"),
        "unknown",
        message.to_string(),
        vec![],
        vec![],
        name,
    )
    .with_subject(name.to_string())
}

/// Run a set of detectors against a project and aggregate their findings in
/// registration order.
pub fn run_detectors(
    project: &ParsedProject,
    detectors: &[Box<dyn Detector>],
) -> Vec<RadarFinding> {
    let mut findings = Vec::new();
    for detector in detectors {
        match detector.run(project) {
            Ok(mut detector_findings) => findings.append(&mut detector_findings),
            Err(err) => findings.push(detector_error_finding(detector.name(), &err.message)),
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dependency, MCPServer, Tool, VulnerabilityEntry};
    use serde_json::Map as JsonMap;
    use std::path::PathBuf;

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
    fn flags_unpinned_and_external_tools() {
        let mut project = empty_project();
        project.tools.push(Tool {
            name: "search".into(),
            version: None,
            source: Some("https://example.com/search".into()),
            scope: None,
        });

        let findings = ToolInventoryDetector.run(&project).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].identifier, "TOOL-NOVERSION::search");
        assert_eq!(findings[1].identifier, "TOOL-EXTERNAL::search");
    }

    #[test]
    fn flags_mcp_server_missing_caps_and_auth() {
        let mut project = empty_project();
        project
            .mcp_servers
            .push(MCPServer::new("inventory", "https://inv", vec![], None));

        let findings = MCPDetector.run(&project).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].identifier, "MCP-NOCAP::inventory");
        assert_eq!(findings[1].identifier, "MCP-NOAUTH::inventory");
        assert_eq!(findings[1].severity.as_str(), "high");
    }

    #[test]
    fn mcp_server_with_caps_and_token_auth_is_clean() {
        let mut project = empty_project();
        project.mcp_servers.push(MCPServer::new(
            "inventory",
            "https://inv",
            vec!["read".into()],
            Some("token".into()),
        ));

        let findings = MCPDetector.run(&project).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn maps_dependency_vulnerability_severity_and_identifier() {
        let mut project = empty_project();
        project.dependencies.push(Dependency {
            name: "requests".into(),
            version: Some("2.0.0".into()),
            license: None,
            vulnerabilities: vec![VulnerabilityEntry {
                id: None,
                cve: Some("CVE-2024-0001".into()),
                severity: "moderate".into(),
                description: None,
                fix_version: Some("2.1.0".into()),
            }],
        });

        let findings = DependencyVulnerabilityDetector.run(&project).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].identifier, "DEP-VULN::requests::CVE-2024-0001");
        assert_eq!(findings[0].severity.as_str(), "medium");
        assert_eq!(findings[0].remediation.as_deref(), Some("2.1.0"));
    }

    #[test]
    fn default_pipeline_is_registered_in_order() {
        let names: Vec<&str> = default_detectors().iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["tool-inventory", "mcp-server", "dependency-vulnerability"]);
    }
}
