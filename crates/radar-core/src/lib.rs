//! Agentic Radar core engine: the pure, deterministic pipeline that turns a
//! parsed agentic project into a sealed security report.
//!
//! This crate owns components A–G and J of the system design: the domain
//! model and taxonomy tables ([`model`]), the project parser ([`parser`]),
//! the AST/config walker ([`walker`]), the default detector pipeline
//! ([`detectors`]), the OWASP taxonomy mapper ([`taxonomy`]), the scenario
//! runner ([`scenario`]), the report builder ([`report`]) and the top-level
//! orchestrator ([`orchestrator`]). Artifact I/O beyond the primary report
//! write (the object store, the evidence packager) lives in the sibling
//! `radar-store` / `radar-evidence` crates.

#![warn(missing_docs)]

pub mod detectors;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod report;
pub mod scenario;
pub mod taxonomy;
pub mod walker;

pub use error::{DetectorError, RadarError, Result};
pub use model::{
    AgentComponent, Dependency, FindingsSummary, InventorySummary, MCPServer, ParsedProject,
    RadarFinding, RadarReport, ReportSummary, RunMode, ScenarioResult, ScenarioStatus, Severity,
    Tool, VulnerabilityEntry,
};
pub use orchestrator::{
    run_scan, run_test, CancellationToken, ScanConfig, ScanResult, TestConfig, TestResult,
};
pub use parser::ProjectParser;
pub use report::ReportBuilder;
