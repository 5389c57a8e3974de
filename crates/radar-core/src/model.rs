//! Domain model for the agentic radar: tools, MCP servers, dependencies,
//! findings and the severity / OWASP taxonomy tables that sit behind them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A named callable exposed to an agent (function, class or registered
/// object).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tool {
    /// Tool name
    pub name: String,
    /// Pinned version, if declared
    pub version: Option<String>,
    /// Origin of the tool (URL or free-form description)
    pub source: Option<String>,
    /// Scope the tool is exposed under
    pub scope: Option<String>,
}

/// A Model-Context-Protocol endpoint referenced by the project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MCPServer {
    /// Server name
    pub name: String,
    /// Endpoint URI
    pub endpoint: String,
    /// Declared capabilities, duplicates collapsed, order preserved
    pub capabilities: Vec<String>,
    /// Authentication mode (`anonymous`/`none`/`token`/`mtls`/free-form).
    /// `None` is treated as `anonymous` by detectors.
    pub auth_mode: Option<String>,
}

impl MCPServer {
    /// Build an MCPServer, collapsing duplicate capabilities while
    /// preserving first-seen order.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        capabilities: Vec<String>,
        auth_mode: Option<String>,
    ) -> Self {
        let mut seen = std::collections::HashSet::new();
        let capabilities = capabilities
            .into_iter()
            .filter(|c| seen.insert(c.clone()))
            .collect();
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            capabilities,
            auth_mode,
        }
    }
}

/// A single vulnerability entry attached to a [`Dependency`], as declared
/// inline in the project manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VulnerabilityEntry {
    /// Vulnerability identifier (GHSA/OSV id, etc.)
    #[serde(default)]
    pub id: Option<String>,
    /// CVE identifier, used as a fallback identifier when `id` is absent
    #[serde(default)]
    pub cve: Option<String>,
    /// Severity as declared by the source feed (not yet canonicalized)
    #[serde(default)]
    pub severity: String,
    /// Human description
    #[serde(default)]
    pub description: Option<String>,
    /// Version that fixes the vulnerability, if known
    #[serde(default)]
    pub fix_version: Option<String>,
}

impl VulnerabilityEntry {
    /// The identifier to use when building a finding: `id`, falling back to
    /// `cve`, falling back to a placeholder derived by the caller.
    pub fn identifier(&self) -> Option<&str> {
        self.id.as_deref().or(self.cve.as_deref())
    }
}

/// Dependency inventory item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dependency {
    /// Package name
    pub name: String,
    /// Installed/declared version
    pub version: Option<String>,
    /// License identifier
    pub license: Option<String>,
    /// Known vulnerabilities for this dependency
    #[serde(default)]
    pub vulnerabilities: Vec<VulnerabilityEntry>,
}

/// An agent component defined (or inferred) in the target project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentComponent {
    /// Agent name
    pub name: String,
    /// Human description
    pub description: Option<String>,
    /// Names of tools this agent is wired to
    #[serde(default)]
    pub tools: Vec<String>,
}

/// Immutable, parsed representation of a target project. Built once per run
/// by the parser and shared by reference across all detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedProject {
    /// Filesystem root the project was parsed from
    pub root: PathBuf,
    /// Project name (from the manifest, or the root directory name)
    pub project_name: String,
    /// Declared agent components
    pub agents: Vec<AgentComponent>,
    /// Declared tools
    pub tools: Vec<Tool>,
    /// Declared MCP servers
    pub mcp_servers: Vec<MCPServer>,
    /// Declared dependencies
    pub dependencies: Vec<Dependency>,
    /// Free-form metadata (manifest_path, manifest_generated,
    /// test_expectations, test_notes, and any caller-supplied keys)
    pub metadata: Map<String, Value>,
}

/// Canonical finding severities. Normalized at construction time — any
/// unrecognized input collapses to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Requires immediate attention
    Critical,
    /// Should be addressed soon
    High,
    /// Should be addressed
    Medium,
    /// Minor issue
    Low,
    /// Informational, no action required
    Info,
    /// Severity could not be determined
    Unknown,
}

impl Severity {
    /// Normalize an arbitrary severity string into a canonical [`Severity`].
    /// `moderate` is accepted as an alias of `medium`; anything else
    /// unrecognized collapses to `Unknown`.
    pub fn normalize(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" | "moderate" => Severity::Medium,
            "low" => Severity::Low,
            "info" => Severity::Info,
            _ => Severity::Unknown,
        }
    }

    /// Canonical lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
            Severity::Unknown => "unknown",
        }
    }

    /// Rank used to compare severities (`critical` highest). `moderate` is a
    /// rank-alias of `medium`; any other input ranks as `unknown` (0).
    pub fn rank(value: &str) -> u8 {
        match value.trim().to_lowercase().as_str() {
            "critical" => 4,
            "high" => 3,
            "medium" | "moderate" => 2,
            "low" => 1,
            _ => 0,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Convert a CVSS numeric score into a canonical severity bucket.
pub fn cvss_score_to_severity(score: f64) -> Severity {
    if score >= 9.0 {
        Severity::Critical
    } else if score >= 7.0 {
        Severity::High
    } else if score >= 4.0 {
        Severity::Medium
    } else if score > 0.0 {
        Severity::Low
    } else {
        Severity::Unknown
    }
}

/// OWASP LLM Top-10 category titles, keyed by code (`LLM01`..`LLM10`).
pub const LLM_CATEGORY_TITLES: &[(&str, &str)] = &[
    ("LLM01", "Prompt Injection"),
    ("LLM02", "Insecure Output Handling"),
    ("LLM03", "Training Data Poisoning"),
    ("LLM04", "Model Denial of Service"),
    ("LLM05", "Supply Chain Vulnerabilities"),
    ("LLM06", "Sensitive Information Disclosure"),
    ("LLM07", "Insecure Plugin Design"),
    ("LLM08", "Excessive Agency"),
    ("LLM09", "Overreliance"),
    ("LLM10", "Model Theft"),
];

/// OWASP Agentic-AI category titles, keyed by code (`AA01`..`AA10`).
pub const AGENTIC_CATEGORY_TITLES: &[(&str, &str)] = &[
    ("AA01", "Prompt & Input Integrity"),
    ("AA02", "Tool Misuse & Escalation"),
    ("AA03", "External Service Abuse"),
    ("AA04", "Sensitive Data Exposure"),
    ("AA05", "Model or Data Exfiltration"),
    ("AA06", "Supply Chain & Dependency Risk"),
    ("AA07", "Secrets & Credential Handling"),
    ("AA08", "Observability & Audit Gaps"),
    ("AA09", "Safety & Policy Violations"),
    ("AA10", "Resilience & Availability"),
];

/// Look up the human title for an OWASP LLM code; `None` for unknown codes
/// or for the agentic free-labels detectors emit directly (e.g.
/// `Agentic-Tooling`).
pub fn llm_title(code: &str) -> Option<&'static str> {
    LLM_CATEGORY_TITLES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, title)| *title)
}

/// Look up the human title for an OWASP Agentic code.
pub fn agentic_title(code: &str) -> Option<&'static str> {
    AGENTIC_CATEGORY_TITLES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, title)| *title)
}

/// A structured security observation surfaced by a detector or the scenario
/// runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarFinding {
    /// Globally unique identifier within a report (`<KIND>::<SUBJECT>[::<EXTRA>]`)
    #[serde(rename = "id")]
    pub identifier: String,
    /// Short title
    pub title: String,
    /// Canonical severity
    pub severity: Severity,
    /// Longer description
    pub description: String,
    /// OWASP LLM codes (`LLM01`..`LLM10`)
    #[serde(default)]
    pub owasp_llm: Vec<String>,
    /// OWASP Agentic codes (`AA01`..`AA10`) or free labels declared by a detector
    #[serde(default)]
    pub owasp_agentic: Vec<String>,
    /// The subject the finding is about (tool/server/dependency name, scenario name, ...)
    #[serde(default)]
    pub subject: Option<String>,
    /// Suggested remediation
    #[serde(default)]
    pub remediation: Option<String>,
    /// Name of the producing detector
    #[serde(default)]
    pub detector: Option<String>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RadarFinding {
    /// Builder-style constructor that normalizes severity and sorts OWASP
    /// codes ascending at construction time, per the domain invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identifier: impl Into<String>,
        title: impl Into<String>,
        severity: impl AsRef<str>,
        description: impl Into<String>,
        owasp_llm: Vec<String>,
        owasp_agentic: Vec<String>,
        detector: impl Into<String>,
    ) -> Self {
        let mut owasp_llm = owasp_llm;
        owasp_llm.sort();
        let mut owasp_agentic = owasp_agentic;
        owasp_agentic.sort();
        Self {
            identifier: identifier.into(),
            title: title.into(),
            severity: Severity::normalize(severity.as_ref()),
            description: description.into(),
            owasp_llm,
            owasp_agentic,
            subject: None,
            remediation: None,
            detector: Some(detector.into()),
            metadata: Map::new(),
        }
    }

    /// Attach a subject
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attach a remediation suggestion
    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    /// Attach free-form metadata
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Outcome of a declared adversarial scenario check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    /// No unsafe/unexpected behavior was observed
    Passed,
    /// Warning-level mitigations triggered
    Warning,
    /// Scenario produced an unsafe response
    Failed,
}

impl std::fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScenarioStatus::Passed => "passed",
            ScenarioStatus::Warning => "warning",
            ScenarioStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Outcome of a single declared scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario name
    pub name: String,
    /// Pass/warn/fail outcome
    pub status: ScenarioStatus,
    /// Optional caller-supplied note
    pub details: Option<String>,
}

/// Severity histogram plus total, keyed by canonical severity name.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FindingsSummary {
    /// Count of findings per canonical severity
    #[serde(flatten)]
    pub by_severity: BTreeMap<String, usize>,
    /// Total findings (sum of `by_severity`)
    pub total: usize,
}

impl FindingsSummary {
    /// Build the severity histogram for a finding set, per the domain
    /// invariant `summary.findings.total == len(findings) ==
    /// sum(summary.findings[sev] for sev != total)`.
    pub fn from_findings(findings: &[RadarFinding]) -> Self {
        let mut by_severity = BTreeMap::new();
        for sev in ["critical", "high", "medium", "low", "info", "unknown"] {
            by_severity.insert(sev.to_string(), 0usize);
        }
        for finding in findings {
            *by_severity.entry(finding.severity.as_str().to_string()).or_insert(0) += 1;
        }
        let total = by_severity.values().sum();
        Self { by_severity, total }
    }
}

/// Inventory cardinalities included in the report summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySummary {
    /// Number of agent components
    pub agents: usize,
    /// Number of tools
    pub tools: usize,
    /// Number of MCP servers
    pub mcp_servers: usize,
    /// Number of dependencies
    pub dependencies: usize,
}

/// Report summary block: findings histogram, inventory cardinalities, mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Findings severity histogram + total
    pub findings: FindingsSummary,
    /// Inventory cardinalities
    pub inventory: InventorySummary,
    /// Run mode (`scan`/`test`)
    pub mode: String,
}

/// Run mode of a radar invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Static detector scan only
    Scan,
    /// Detector scan plus scenario runner
    Test,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunMode::Scan => "scan",
            RunMode::Test => "test",
        };
        write!(f, "{s}")
    }
}

/// Final report produced by a radar run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarReport {
    /// Project name
    pub project_name: String,
    /// Run mode
    pub mode: RunMode,
    /// UTC RFC-3339 timestamp with trailing `Z`
    pub generated_at: String,
    /// Findings, in (detector-order, per-detector-emit-order)
    pub findings: Vec<RadarFinding>,
    /// Project snapshot, present iff the run requested it
    pub parsed_project: Option<ParsedProject>,
    /// Summary block
    pub summary: ReportSummary,
    /// Trace identifiers attached to the run
    #[serde(default)]
    pub trace_ids: Vec<String>,
    /// Scenario outcomes (empty for `scan` runs)
    #[serde(default)]
    pub scenario_results: Vec<ScenarioResult>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
}
