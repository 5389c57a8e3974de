//! Scenario runner: evaluates declared adversarial scenario expectations
//! from project metadata and produces pass/warn/fail outcomes plus
//! synthetic findings for anything short of a clean pass.

use crate::model::{RadarFinding, ScenarioResult, ScenarioStatus};
use crate::model::ParsedProject;
use serde_json::Value;

/// Default scenario set, evaluated when a run doesn't override it.
pub const DEFAULT_SCENARIOS: &[&str] = &["prompt-injection", "pii-leakage", "harmful-content", "tool-abuse"];

/// Runs declared scenarios against a project's `test_expectations` /
/// `test_notes` metadata.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    scenarios: Vec<String>,
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self {
            scenarios: DEFAULT_SCENARIOS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ScenarioRunner {
    /// Build a runner over a custom scenario set.
    pub fn new(scenarios: Vec<String>) -> Self {
        if scenarios.is_empty() {
            Self::default()
        } else {
            Self { scenarios }
        }
    }

    /// The runner's own scenario list, used as the default when a caller
    /// does not override it.
    pub fn scenarios(&self) -> &[String] {
        &self.scenarios
    }

    /// Evaluate `override_scenarios` (or this runner's own set when empty)
    /// against `project.metadata.test_expectations` / `test_notes`.
    pub fn run(
        &self,
        project: &ParsedProject,
        override_scenarios: Option<&[String]>,
    ) -> (Vec<RadarFinding>, Vec<ScenarioResult>) {
        let scenario_names: &[String] = override_scenarios.unwrap_or(&self.scenarios);
        let expectations = project.metadata.get("test_expectations").and_then(Value::as_object);
        let notes = project.metadata.get("test_notes").and_then(Value::as_object);

        let mut findings = Vec::new();
        let mut results = Vec::new();

        for scenario in scenario_names {
            let expectation = expectations
                .and_then(|m| m.get(scenario))
                .and_then(Value::as_str)
                .unwrap_or("pass")
                .to_lowercase();
            let detail = notes
                .and_then(|m| m.get(scenario))
                .and_then(Value::as_str)
                .map(str::to_string);

            match expectation.as_str() {
                "fail" | "failed" => {
                    results.push(ScenarioResult {
                        name: scenario.clone(),
                        status: ScenarioStatus::Failed,
                        details: detail.clone(),
                    });
                    findings.push(
                        RadarFinding::new(
                            format!("SCENARIO-FAIL::{scenario}"),
                            format!("Scenario '{scenario}' failed security tests"),
                            "high",
                            format!("Scenario '{scenario}' produced an unsafe response during radar tests."),
                            vec!["LLM01".to_string()],
                            vec!["Agentic-Adversarial".to_string()],
                            "scenario-runner",
                        )
                        .with_subject(scenario.clone())
                        .with_remediation("Review guardrails and mitigations for this scenario."),
                    );
                }
                "warn" | "warning" => {
                    results.push(ScenarioResult {
                        name: scenario.clone(),
                        status: ScenarioStatus::Warning,
                        details: detail.clone(),
                    });
                    findings.push(
                        RadarFinding::new(
                            format!("SCENARIO-WARN::{scenario}"),
                            format!("Scenario '{scenario}' produced warning signals"),
                            "medium",
                            format!("Scenario '{scenario}' triggered warning-level mitigations."),
                            vec!["LLM03".to_string()],
                            vec![],
                            "scenario-runner",
                        )
                        .with_subject(scenario.clone())
                        .with_remediation("Investigate mitigations and tighten guard thresholds."),
                    );
                }
                _ => {
                    results.push(ScenarioResult {
                        name: scenario.clone(),
                        status: ScenarioStatus::Passed,
                        details: detail,
                    });
                }
            }
        }

        (findings, results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use std::path::PathBuf;

    fn project_with_expectations(expectations: Value) -> ParsedProject {
        let mut metadata = Map::new();
        metadata.insert("test_expectations".into(), expectations);
        ParsedProject {
            root: PathBuf::from("/tmp/demo"),
            project_name: "demo".into(),
            agents: vec![],
            tools: vec![],
            mcp_servers: vec![],
            dependencies: vec![],
            metadata,
        }
    }

    #[test]
    fn scenario_fail_produces_high_finding() {
        let project = project_with_expectations(json!({"prompt-injection": "fail", "pii-leakage": "pass"}));
        let runner = ScenarioRunner::default();
        let scenarios = vec!["prompt-injection".to_string(), "pii-leakage".to_string()];
        let (findings, results) = runner.run(&project, Some(&scenarios));

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, ScenarioStatus::Failed);
        assert_eq!(results[1].status, ScenarioStatus::Passed);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].identifier, "SCENARIO-FAIL::prompt-injection");
        assert_eq!(findings[0].severity.as_str(), "high");
    }

    #[test]
    fn scenario_warn_produces_medium_finding_no_llm_agentic_default() {
        let project = project_with_expectations(json!({"tool-abuse": "warn"}));
        let runner = ScenarioRunner::default();
        let scenarios = vec!["tool-abuse".to_string()];
        let (findings, _) = runner.run(&project, Some(&scenarios));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity.as_str(), "medium");
        assert_eq!(findings[0].owasp_llm, vec!["LLM03".to_string()]);
    }

    #[test]
    fn missing_expectation_passes_with_no_finding() {
        let project = project_with_expectations(json!({}));
        let runner = ScenarioRunner::default();
        let scenarios = vec!["harmful-content".to_string()];
        let (findings, results) = runner.run(&project, Some(&scenarios));
        assert!(findings.is_empty());
        assert_eq!(results[0].status, ScenarioStatus::Passed);
    }
}
