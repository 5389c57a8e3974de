//! OWASP taxonomy mapper: normalizes OSV and pip-audit vulnerability
//! payloads into a unified shape and assigns OWASP LLM / Agentic category
//! labels via a declarative rule engine. This is a richer pipeline than the
//! inline-manifest [`crate::detectors::DependencyVulnerabilityDetector`] —
//! the two coexist and are never cross-applied (see DESIGN.md).

use crate::model::{agentic_title, llm_title};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

/// Severity rank table used by the mapper, independent of
/// [`crate::model::Severity`] since vulnerability severities here are
/// free-form strings from external scanners until a rule has run.
fn severity_rank(value: &str) -> u8 {
    match value.trim().to_lowercase().as_str() {
        "critical" => 4,
        "high" => 3,
        "medium" | "moderate" => 2,
        "low" => 1,
        _ => 0,
    }
}

/// A vulnerability finding normalized from an external scanner payload
/// (OSV, pip-audit), prior to or after OWASP rule application.
#[derive(Debug, Clone, Default)]
pub struct VulnerabilityFinding {
    /// Package/dependency name
    pub package: String,
    /// Affected version
    pub version: String,
    /// Package ecosystem (`PyPI`, `npm`, ...)
    pub ecosystem: Option<String>,
    /// Vulnerability identifier (OSV id, GHSA id, CVE, ...)
    pub vulnerability_id: String,
    /// Severity as reported by the source, upper-cased when derived from a
    /// CVSS score or `database_specific.severity`
    pub severity: Option<String>,
    /// Human summary/description
    pub summary: Option<String>,
    /// Alternate identifiers for the same vulnerability
    pub aliases: Vec<String>,
    /// Versions known to fix the vulnerability
    pub fix_versions: Vec<String>,
    /// Reference URLs
    pub references: Vec<String>,
    /// Originating feed (`osv`, `pip-audit`)
    pub source: Option<String>,
    /// Source file/location, when known
    pub location: Option<String>,
    /// OWASP LLM codes assigned by the mapper
    pub owasp_llm: Vec<String>,
    /// OWASP Agentic codes assigned by the mapper
    pub owasp_agentic: Vec<String>,
    /// Free-form metadata carried alongside the finding
    pub metadata: Map<String, Value>,
}

impl VulnerabilityFinding {
    fn dedup_key(&self) -> (String, String) {
        (self.package.to_lowercase(), self.vulnerability_id.to_uppercase())
    }
}

/// A declarative rule mapping vulnerability attributes to OWASP category
/// codes. A rule matches iff every constraint it declares holds.
#[derive(Debug, Clone, Default)]
pub struct MappingRule {
    /// LLM codes assigned when this rule matches
    pub llm_codes: Vec<&'static str>,
    /// Agentic codes assigned when this rule matches
    pub agentic_codes: Vec<&'static str>,
    /// Keywords; at least one must appear (case-insensitive substring) in
    /// `summary ∪ aliases` when non-empty
    pub keywords: Vec<&'static str>,
    /// Required package name (trim+lowercase equality)
    pub package: Option<&'static str>,
    /// Required ecosystem (trim+lowercase equality)
    pub ecosystem: Option<&'static str>,
    /// Required id prefixes (case-insensitive, checked against id and aliases)
    pub id_prefixes: Vec<&'static str>,
    /// Minimum severity rank required, by name
    pub severity_at_least: Option<&'static str>,
}

impl MappingRule {
    /// Does this rule match the given finding?
    pub fn matches(&self, finding: &VulnerabilityFinding) -> bool {
        if let Some(package) = self.package {
            if finding.package.trim().to_lowercase() != package.trim().to_lowercase() {
                return false;
            }
        }
        if let Some(ecosystem) = self.ecosystem {
            let actual = finding.ecosystem.as_deref().unwrap_or("").trim().to_lowercase();
            if actual != ecosystem.trim().to_lowercase() {
                return false;
            }
        }
        if !self.id_prefixes.is_empty() {
            let identifier = finding.vulnerability_id.to_uppercase();
            let aliases: Vec<String> = finding.aliases.iter().map(|a| a.to_uppercase()).collect();
            let hits = self.id_prefixes.iter().any(|prefix| {
                let prefix = prefix.to_uppercase();
                identifier.starts_with(&prefix) || aliases.iter().any(|a| a.starts_with(&prefix))
            });
            if !hits {
                return false;
            }
        }
        if !self.keywords.is_empty() {
            let mut haystack = finding.summary.clone().unwrap_or_default();
            haystack.push(' ');
            haystack.push_str(&finding.aliases.join(" "));
            let haystack = haystack.to_lowercase();
            if !self.keywords.iter().any(|kw| haystack.contains(&kw.to_lowercase())) {
                return false;
            }
        }
        if let Some(required) = self.severity_at_least {
            let required_rank = severity_rank(required);
            let actual_rank = severity_rank(finding.severity.as_deref().unwrap_or(""));
            if actual_rank < required_rank {
                return false;
            }
        }
        true
    }
}

/// The contractual default rule table (spec §4.E) — other scanners should
/// preserve these exact triggers.
pub fn default_rules() -> Vec<MappingRule> {
    vec![
        MappingRule {
            llm_codes: vec!["LLM01"],
            agentic_codes: vec!["AA01"],
            keywords: vec!["prompt injection", "prompt-injection"],
            ..Default::default()
        },
        MappingRule {
            llm_codes: vec!["LLM07"],
            agentic_codes: vec!["AA02"],
            keywords: vec!["remote code execution", "command injection", "arbitrary command"],
            ..Default::default()
        },
        MappingRule {
            llm_codes: vec!["LLM06"],
            agentic_codes: vec!["AA04"],
            keywords: vec!["information disclosure", "sensitive data", "secret exposure"],
            ..Default::default()
        },
        MappingRule {
            llm_codes: vec!["LLM04"],
            agentic_codes: vec!["AA10"],
            keywords: vec!["denial of service", "dos", "resource exhaustion"],
            ..Default::default()
        },
        MappingRule {
            llm_codes: vec!["LLM07"],
            agentic_codes: vec!["AA03"],
            keywords: vec!["ssrf", "server-side request forgery", "unvalidated request"],
            ..Default::default()
        },
        MappingRule {
            llm_codes: vec!["LLM05"],
            agentic_codes: vec!["AA06"],
            keywords: vec!["supply chain", "dependency", "package takeover"],
            ..Default::default()
        },
        MappingRule {
            llm_codes: vec!["LLM07"],
            agentic_codes: vec!["AA07"],
            keywords: vec!["credential", "secret", "token leak"],
            ..Default::default()
        },
    ]
}

/// Applies mapping rules to vulnerability findings, falling back to a
/// default category pair when no rule matches.
pub struct OwaspMapper {
    rules: Vec<MappingRule>,
    default_llm_codes: Vec<&'static str>,
    default_agentic_codes: Vec<&'static str>,
}

impl Default for OwaspMapper {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            default_llm_codes: vec!["LLM05"],
            default_agentic_codes: vec!["AA06"],
        }
    }
}

impl OwaspMapper {
    /// Build a mapper with a custom rule table.
    pub fn with_rules(rules: Vec<MappingRule>) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Apply the rule table to `finding`, setting its `owasp_llm` /
    /// `owasp_agentic` fields (sorted ascending, deduplicated). The human
    /// title for each code is looked up from [`crate::model`] at render
    /// time, not stored inline here.
    pub fn apply(&self, mut finding: VulnerabilityFinding) -> VulnerabilityFinding {
        let mut llm: BTreeSet<&'static str> = BTreeSet::new();
        let mut agentic: BTreeSet<&'static str> = BTreeSet::new();
        for rule in &self.rules {
            if rule.matches(&finding) {
                llm.extend(rule.llm_codes.iter());
                agentic.extend(rule.agentic_codes.iter());
            }
        }
        if llm.is_empty() {
            llm.extend(self.default_llm_codes.iter());
        }
        if agentic.is_empty() {
            agentic.extend(self.default_agentic_codes.iter());
        }
        finding.owasp_llm = llm.into_iter().map(str::to_string).collect();
        finding.owasp_agentic = agentic.into_iter().map(str::to_string).collect();
        finding
    }
}

/// Look up `"{code} - {title}"` for display purposes, matching the
/// original's rendered category strings.
pub fn format_llm_category(code: &str) -> String {
    format!("{code} - {}", llm_title(code).unwrap_or("Unknown"))
}

/// Look up `"{code} - {title}"` for an agentic code.
pub fn format_agentic_category(code: &str) -> String {
    format!("{code} - {}", agentic_title(code).unwrap_or("Unknown"))
}

/// Normalizes OSV and pip-audit payloads into [`VulnerabilityFinding`]s and
/// merges cross-source duplicates.
pub struct VulnerabilityMapper {
    owasp_mapper: OwaspMapper,
}

impl Default for VulnerabilityMapper {
    fn default() -> Self {
        Self {
            owasp_mapper: OwaspMapper::default(),
        }
    }
}

impl VulnerabilityMapper {
    /// Build a mapper around a custom [`OwaspMapper`].
    pub fn new(owasp_mapper: OwaspMapper) -> Self {
        Self { owasp_mapper }
    }

    /// Parse an OSV-shaped payload (`{"results": [{"packages": [...]}]}`).
    /// One finding per `(package, version, vuln_id)` triple.
    pub fn from_osv(&self, payload: &Value) -> Vec<VulnerabilityFinding> {
        let mut findings = Vec::new();
        let Some(results) = payload.get("results").and_then(Value::as_array) else {
            return findings;
        };
        for result in results {
            let location = extract_source_path(result.get("source"));
            let Some(packages) = result.get("packages").and_then(Value::as_array) else {
                continue;
            };
            for package in packages {
                let pkg_meta = package.get("package").cloned().unwrap_or(Value::Null);
                let package_name = pkg_meta
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                let ecosystem = pkg_meta.get("ecosystem").and_then(Value::as_str).map(str::to_string);
                let versions: Vec<String> = package
                    .get("versions")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .filter(|v: &Vec<String>| !v.is_empty())
                    .unwrap_or_else(|| vec!["unknown".to_string()]);

                let Some(vulns) = package.get("vulnerabilities").and_then(Value::as_array) else {
                    continue;
                };
                for vuln in vulns {
                    let severity = extract_osv_severity(vuln);
                    let summary = vuln
                        .get("summary")
                        .or_else(|| vuln.get("details"))
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    let aliases: Vec<String> = vuln
                        .get("aliases")
                        .and_then(Value::as_array)
                        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                        .unwrap_or_default();
                    let references: Vec<String> = vuln
                        .get("references")
                        .and_then(Value::as_array)
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(|r| r.get("url").and_then(Value::as_str))
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                    let fix_versions = extract_osv_fix_versions(vuln);
                    let vuln_id = vuln
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .or_else(|| aliases.first().cloned())
                        .unwrap_or_else(|| package_name.clone());

                    for version in &versions {
                        let mut metadata = Map::new();
                        metadata.insert("source".into(), Value::String("osv".into()));
                        if let Some(path) = &location {
                            metadata.insert("path".into(), Value::String(path.clone()));
                        }
                        let finding = VulnerabilityFinding {
                            package: package_name.clone(),
                            version: version.clone(),
                            ecosystem: ecosystem.clone(),
                            vulnerability_id: vuln_id.clone(),
                            severity: severity.clone(),
                            summary: summary.clone(),
                            aliases: aliases.clone(),
                            fix_versions: fix_versions.clone(),
                            references: references.clone(),
                            source: Some("osv".to_string()),
                            location: location.clone(),
                            owasp_llm: Vec::new(),
                            owasp_agentic: Vec::new(),
                            metadata,
                        };
                        findings.push(self.owasp_mapper.apply(finding));
                    }
                }
            }
        }
        findings
    }

    /// Parse a pip-audit-shaped payload (`{"dependencies": [...]}`).
    /// One finding per `(dependency, vuln)` pair, ecosystem fixed to `PyPI`.
    pub fn from_pip_audit(&self, payload: &Value) -> Vec<VulnerabilityFinding> {
        let mut findings = Vec::new();
        let Some(dependencies) = payload.get("dependencies").and_then(Value::as_array) else {
            return findings;
        };
        for dependency in dependencies {
            let package_name = dependency.get("name").and_then(Value::as_str).unwrap_or("unknown").to_string();
            let version = dependency.get("version").and_then(Value::as_str).unwrap_or("unknown").to_string();
            let Some(vulns) = dependency.get("vulns").and_then(Value::as_array) else {
                continue;
            };
            for vuln in vulns {
                let vuln_id = vuln
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| package_name.clone());
                let aliases: Vec<String> = vuln
                    .get("aliases")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                let severity = vuln.get("severity").and_then(Value::as_str).map(|s| s.to_uppercase());
                let summary = vuln
                    .get("description")
                    .or_else(|| vuln.get("summary"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let fix_versions: Vec<String> = vuln
                    .get("fix_versions")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                let references: Vec<String> = vuln
                    .get("references")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();

                let mut metadata = Map::new();
                metadata.insert("source".into(), Value::String("pip-audit".into()));
                let finding = VulnerabilityFinding {
                    package: package_name.clone(),
                    version: version.clone(),
                    ecosystem: Some("PyPI".to_string()),
                    vulnerability_id: vuln_id,
                    severity,
                    summary,
                    aliases,
                    fix_versions,
                    references,
                    source: Some("pip-audit".to_string()),
                    location: Some("pip-audit".to_string()),
                    owasp_llm: Vec::new(),
                    owasp_agentic: Vec::new(),
                    metadata,
                };
                findings.push(self.owasp_mapper.apply(finding));
            }
        }
        findings
    }

    /// Deduplicate/merge findings across one or more groups, keyed by
    /// `(lowercase package, uppercase vulnerability id)`. On collision,
    /// aliases/fix-versions/references are unioned, the higher severity
    /// (by rank, ties keep the first non-empty value) wins, the first
    /// non-null summary/location is kept, and the rule engine is re-run on
    /// the merged record.
    pub fn merge<I>(&self, groups: I) -> Vec<VulnerabilityFinding>
    where
        I: IntoIterator<Item = Vec<VulnerabilityFinding>>,
    {
        let mut merged: HashMap<(String, String), VulnerabilityFinding> = HashMap::new();
        let mut order: Vec<(String, String)> = Vec::new();
        for group in groups {
            for finding in group {
                let key = finding.dedup_key();
                match merged.get(&key) {
                    None => {
                        order.push(key.clone());
                        merged.insert(key, finding);
                    }
                    Some(existing) => {
                        let combined = merge_findings(existing.clone(), finding);
                        merged.insert(key, self.owasp_mapper.apply(combined));
                    }
                }
            }
        }
        order.into_iter().filter_map(|key| merged.remove(&key)).collect()
    }
}

fn extract_source_path(source: Option<&Value>) -> Option<String> {
    let source = source?.as_object()?;
    for key in ["path", "file", "name"] {
        if let Some(value) = source.get(key).and_then(Value::as_str) {
            return Some(value.to_string());
        }
    }
    None
}

fn score_to_float(score: &str) -> Option<f64> {
    let score = score.split('/').next().unwrap_or(score);
    score.trim().parse::<f64>().ok()
}

fn severity_from_score(score: f64) -> String {
    if score >= 9.0 {
        "CRITICAL".to_string()
    } else if score >= 7.0 {
        "HIGH".to_string()
    } else if score >= 4.0 {
        "MEDIUM".to_string()
    } else if score > 0.0 {
        "LOW".to_string()
    } else {
        "UNKNOWN".to_string()
    }
}

fn extract_osv_severity(vuln: &Value) -> Option<String> {
    let scores: Vec<f64> = vuln
        .get("severity")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|entry| entry.get("score").and_then(Value::as_str))
                .filter_map(score_to_float)
                .collect()
        })
        .unwrap_or_default();
    if let Some(max) = scores.into_iter().fold(None, |acc: Option<f64>, v| {
        Some(acc.map_or(v, |a| a.max(v)))
    }) {
        return Some(severity_from_score(max));
    }
    vuln.get("database_specific")
        .and_then(|d| d.get("severity"))
        .and_then(Value::as_str)
        .map(str::to_uppercase)
}

fn extract_osv_fix_versions(vuln: &Value) -> Vec<String> {
    let mut versions: BTreeSet<String> = BTreeSet::new();
    for key in ["fix_versions", "fixed_versions"] {
        if let Some(items) = vuln.get(key).and_then(Value::as_array) {
            versions.extend(items.iter().filter_map(Value::as_str).map(str::to_string));
        }
    }
    if let Some(database_specific) = vuln.get("database_specific") {
        for key in ["fix_versions", "fixed_versions"] {
            if let Some(items) = database_specific.get(key).and_then(Value::as_array) {
                versions.extend(items.iter().filter_map(Value::as_str).map(str::to_string));
            }
        }
    }
    if let Some(affected) = vuln.get("affected").and_then(Value::as_array) {
        for entry in affected {
            let Some(ranges) = entry.get("ranges").and_then(Value::as_array) else {
                continue;
            };
            for range in ranges {
                let Some(events) = range.get("events").and_then(Value::as_array) else {
                    continue;
                };
                for event in events {
                    if let Some(fixed) = event.get("fixed").and_then(Value::as_str) {
                        versions.insert(fixed.to_string());
                    }
                }
            }
        }
    }
    versions.into_iter().collect()
}

fn pick_more_severe(left: &Option<String>, right: &Option<String>) -> Option<String> {
    let left_lower = left.clone().unwrap_or_default().to_lowercase();
    let right_lower = right.clone().unwrap_or_default().to_lowercase();
    let left_rank = severity_rank(&left_lower);
    let right_rank = severity_rank(&right_lower);
    if left_rank == 0 && right_rank == 0 {
        return left.clone().or_else(|| right.clone());
    }
    if left_rank >= right_rank {
        left.clone()
    } else {
        right.clone()
    }
}

fn merge_findings(left: VulnerabilityFinding, right: VulnerabilityFinding) -> VulnerabilityFinding {
    let aliases: BTreeSet<String> = left.aliases.into_iter().chain(right.aliases).collect();
    let fix_versions: BTreeSet<String> = left.fix_versions.into_iter().chain(right.fix_versions).collect();
    let references: BTreeSet<String> = left.references.into_iter().chain(right.references).collect();
    let severity = pick_more_severe(&left.severity, &right.severity);
    let summary = left.summary.or(right.summary);
    let location = left.location.or(right.location);
    let mut metadata = left.metadata;
    for (k, v) in right.metadata {
        metadata.insert(k, v);
    }
    VulnerabilityFinding {
        package: left.package,
        version: if left.version.is_empty() { right.version } else { left.version },
        ecosystem: left.ecosystem.or(right.ecosystem),
        vulnerability_id: left.vulnerability_id,
        severity,
        summary,
        aliases: aliases.into_iter().collect(),
        fix_versions: fix_versions.into_iter().collect(),
        references: references.into_iter().collect(),
        source: left.source.or(right.source),
        location,
        owasp_llm: Vec::new(),
        owasp_agentic: Vec::new(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rce_keyword_maps_to_llm07_aa02_not_default() {
        let mapper = VulnerabilityMapper::default();
        let payload = json!({
            "results": [{
                "packages": [{
                    "package": {"name": "libfoo", "ecosystem": "PyPI"},
                    "versions": ["1.0.0"],
                    "vulnerabilities": [{
                        "id": "OSV-1",
                        "summary": "Remote code execution in libfoo",
                    }]
                }]
            }]
        });
        let findings = mapper.from_osv(&payload);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].owasp_llm, vec!["LLM07"]);
        assert_eq!(findings[0].owasp_agentic, vec!["AA02"]);
    }

    #[test]
    fn no_matching_rule_falls_back_to_default_codes() {
        let mapper = VulnerabilityMapper::default();
        let payload = json!({
            "results": [{
                "packages": [{
                    "package": {"name": "libfoo"},
                    "versions": ["1.0.0"],
                    "vulnerabilities": [{"id": "OSV-2", "summary": "Obscure issue with no keyword hit"}]
                }]
            }]
        });
        let findings = mapper.from_osv(&payload);
        assert_eq!(findings[0].owasp_llm, vec!["LLM05"]);
        assert_eq!(findings[0].owasp_agentic, vec!["AA06"]);
    }

    #[test]
    fn osv_severity_derived_from_max_cvss_score() {
        let mapper = VulnerabilityMapper::default();
        let payload = json!({
            "results": [{
                "packages": [{
                    "package": {"name": "libfoo"},
                    "versions": ["1.0.0"],
                    "vulnerabilities": [{
                        "id": "OSV-3",
                        "severity": [{"type": "CVSS_V3", "score": "9.8/AV:N"}],
                    }]
                }]
            }]
        });
        let findings = mapper.from_osv(&payload);
        assert_eq!(findings[0].severity.as_deref(), Some("CRITICAL"));
    }

    #[test]
    fn pip_audit_severity_is_upper_cased() {
        let mapper = VulnerabilityMapper::default();
        let payload = json!({
            "dependencies": [{
                "name": "requests",
                "version": "2.0.0",
                "vulns": [{"id": "GHSA-1", "severity": "high"}]
            }]
        });
        let findings = mapper.from_pip_audit(&payload);
        assert_eq!(findings[0].ecosystem.as_deref(), Some("PyPI"));
        assert_eq!(findings[0].severity.as_deref(), Some("HIGH"));
    }

    #[test]
    fn merge_unions_aliases_and_keeps_higher_severity() {
        let mapper = VulnerabilityMapper::default();
        let left = VulnerabilityFinding {
            package: "libfoo".into(),
            vulnerability_id: "GHSA-1".into(),
            severity: Some("LOW".into()),
            aliases: vec!["CVE-1".into()],
            ..Default::default()
        };
        let right = VulnerabilityFinding {
            package: "libfoo".into(),
            vulnerability_id: "ghsa-1".into(),
            severity: Some("HIGH".into()),
            aliases: vec!["CVE-2".into()],
            ..Default::default()
        };
        let merged = mapper.merge([vec![left], vec![right]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].severity.as_deref(), Some("HIGH"));
        assert_eq!(merged[0].aliases, vec!["CVE-1".to_string(), "CVE-2".to_string()]);
    }
}
