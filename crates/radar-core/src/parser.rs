//! Project parser: loads an `agentic_radar.json`-shaped manifest, or derives
//! a minimal one by walking the source tree when no manifest is present.

use crate::error::{RadarError, Result};
use crate::model::{AgentComponent, Dependency, MCPServer, ParsedProject, Tool};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

/// Manifest filenames searched for, in order, under the project root when no
/// explicit manifest path is supplied.
pub const MANIFEST_CANDIDATES: &[&str] = &[
    "agentic_radar.json",
    "agentic_radar_manifest.json",
    "radar_manifest.json",
];

/// Top-level manifest keys the parser accepts; anything else is rejected
/// unless it lives under `metadata`.
const ALLOWED_TOP_LEVEL_KEYS: &[&str] = &[
    "project",
    "project_name",
    "agents",
    "tools",
    "mcp_servers",
    "dependencies",
    "metadata",
];

/// Default source extension the manifest-derivation walker looks for when no
/// manifest is present, matching the original implementation's `.py` default.
pub const DEFAULT_SOURCE_EXTENSION: &str = "py";

/// Parses agentic projects into a [`ParsedProject`].
#[derive(Debug, Clone, Default)]
pub struct ProjectParser {
    explicit_manifest: Option<PathBuf>,
    /// Source extension used by the manifest-derivation fallback, without a
    /// leading dot. Defaults to [`DEFAULT_SOURCE_EXTENSION`].
    source_extension: Option<String>,
}

impl ProjectParser {
    /// Create a parser with default manifest discovery and a `.py`
    /// derivation fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a specific manifest path instead of auto-discovering one.
    pub fn with_manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_manifest = Some(path.into());
        self
    }

    /// Override the source extension used when deriving a manifest from the
    /// source tree (e.g. `"ts"` for a TypeScript project).
    pub fn with_source_extension(mut self, extension: impl Into<String>) -> Self {
        self.source_extension = Some(extension.into());
        self
    }

    fn extension(&self) -> &str {
        self.source_extension.as_deref().unwrap_or(DEFAULT_SOURCE_EXTENSION)
    }

    /// Parse `root` into a [`ParsedProject`].
    #[instrument(skip(self), fields(root = %root.as_ref().display()))]
    pub fn parse(&self, root: impl AsRef<Path>) -> Result<ParsedProject> {
        let root = root.as_ref();
        if !root.exists() || !root.is_dir() {
            return Err(RadarError::Parser(format!(
                "project root '{}' does not exist or is not a directory",
                root.display()
            )));
        }
        let root = root
            .canonicalize()
            .unwrap_or_else(|_| root.to_path_buf());

        let manifest_path = self
            .explicit_manifest
            .clone()
            .or_else(|| self.discover_manifest(&root));

        let (data, manifest_path) = match manifest_path {
            Some(path) => (self.load_manifest(&path)?, Some(path)),
            None => (self.derive_manifest(&root), None),
        };

        self.build_project(root, data, manifest_path)
    }

    fn discover_manifest(&self, root: &Path) -> Option<PathBuf> {
        for candidate in MANIFEST_CANDIDATES {
            let path = root.join(candidate);
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    fn load_manifest(&self, path: &Path) -> Result<Map<String, Value>> {
        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text).map_err(|err| {
            RadarError::Parser(format!("failed to parse manifest '{}': {err}", path.display()))
        })?;
        let object = value.as_object().cloned().ok_or_else(|| {
            RadarError::Parser(format!("manifest '{}' is not a JSON object", path.display()))
        })?;
        for key in object.keys() {
            if !ALLOWED_TOP_LEVEL_KEYS.contains(&key.as_str()) {
                return Err(RadarError::Parser(format!(
                    "manifest '{}' has unknown top-level key '{key}'",
                    path.display()
                )));
            }
        }
        Ok(object)
    }

    /// Walk the source tree and synthesize a minimal manifest: every source
    /// file whose stem doesn't start with `test_` becomes a synthetic agent,
    /// deduplicated by dashed name.
    fn derive_manifest(&self, root: &Path) -> Map<String, Value> {
        let extension = self.extension();
        let mut seen = HashSet::new();
        let mut agents = Vec::new();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping unreadable entry during manifest derivation: {err}");
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let ext_matches = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(extension))
                .unwrap_or(false);
            if !ext_matches {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with("test_") {
                continue;
            }
            let agent_name = stem.replace('_', "-");
            if !seen.insert(agent_name.clone()) {
                continue;
            }
            debug!("derived agent '{agent_name}' from {}", path.display());
            agents.push(serde_json::json!({ "name": agent_name, "tools": [] }));
        }

        let project_name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let mut metadata = Map::new();
        metadata.insert("derived_from_source".into(), Value::Bool(true));

        let mut manifest = Map::new();
        manifest.insert("project".into(), Value::String(project_name));
        manifest.insert("agents".into(), Value::Array(agents));
        manifest.insert("tools".into(), Value::Array(vec![]));
        manifest.insert("mcp_servers".into(), Value::Array(vec![]));
        manifest.insert("dependencies".into(), Value::Array(vec![]));
        manifest.insert("metadata".into(), Value::Object(metadata));
        manifest
    }

    fn build_project(
        &self,
        root: PathBuf,
        data: Map<String, Value>,
        manifest_path: Option<PathBuf>,
    ) -> Result<ParsedProject> {
        let project_name = data
            .get("project")
            .or_else(|| data.get("project_name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                root.file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown")
                    .to_string()
            });

        let agents = data
            .get("agents")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(parse_agent).collect())
            .unwrap_or_default();

        let tools = data
            .get("tools")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(parse_tool).collect())
            .unwrap_or_default();

        let mcp_servers = data
            .get("mcp_servers")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(parse_mcp_server).collect())
            .unwrap_or_default();

        let dependencies = data
            .get("dependencies")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(parse_dependency).collect())
            .unwrap_or_default();

        let mut metadata = data
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        match &manifest_path {
            Some(path) => {
                metadata
                    .entry("manifest_path")
                    .or_insert_with(|| Value::String(path.display().to_string()));
                metadata
                    .entry("manifest_discovered")
                    .or_insert_with(|| Value::Bool(true));
            }
            None => {
                metadata
                    .entry("manifest_generated")
                    .or_insert_with(|| Value::Bool(true));
            }
        }

        Ok(ParsedProject {
            root,
            project_name,
            agents,
            tools,
            mcp_servers,
            dependencies,
            metadata,
        })
    }
}

fn parse_agent(value: &Value) -> AgentComponent {
    AgentComponent {
        name: string_field(value, "name").unwrap_or_else(|| "unknown".to_string()),
        description: string_field(value, "description"),
        tools: string_list_field(value, "tools"),
    }
}

fn parse_tool(value: &Value) -> Tool {
    Tool {
        name: string_field(value, "name").unwrap_or_else(|| "unknown".to_string()),
        version: string_field(value, "version"),
        source: string_field(value, "source"),
        scope: string_field(value, "scope"),
    }
}

fn parse_mcp_server(value: &Value) -> MCPServer {
    MCPServer::new(
        string_field(value, "name").unwrap_or_else(|| "unknown".to_string()),
        string_field(value, "endpoint").unwrap_or_default(),
        string_list_field(value, "capabilities"),
        string_field(value, "auth_mode"),
    )
}

fn parse_dependency(value: &Value) -> Dependency {
    let vulnerabilities = value
        .get("vulnerabilities")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    Dependency {
        name: string_field(value, "name").unwrap_or_else(|| "unknown".to_string()),
        version: string_field(value, "version"),
        license: string_field(value, "license"),
        vulnerabilities,
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

fn string_list_field(value: &Value, field: &str) -> Vec<String> {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_root_is_an_error() {
        let parser = ProjectParser::new();
        let err = parser.parse("/does/not/exist").unwrap_err();
        assert!(matches!(err, RadarError::Parser(_)));
    }

    #[test]
    fn parses_explicit_manifest() {
        let dir = TempDir::new().unwrap();
        let manifest_path = dir.path().join("agentic_radar.json");
        std::fs::write(
            &manifest_path,
            r#"{
                "project": "demo",
                "tools": [{"name": "search", "source": "https://example.com/t"}],
                "mcp_servers": [{"name": "inv", "endpoint": "https://inv", "auth_mode": "anonymous"}]
            }"#,
        )
        .unwrap();

        let project = ProjectParser::new().parse(dir.path()).unwrap();
        assert_eq!(project.project_name, "demo");
        assert_eq!(project.tools.len(), 1);
        assert_eq!(project.tools[0].name, "search");
        assert_eq!(project.mcp_servers[0].auth_mode.as_deref(), Some("anonymous"));
        assert_eq!(
            project.metadata.get("manifest_discovered"),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn rejects_unknown_top_level_keys() {
        let dir = TempDir::new().unwrap();
        let manifest_path = dir.path().join("agentic_radar.json");
        std::fs::write(&manifest_path, r#"{"project": "demo", "bogus": 1}"#).unwrap();
        let err = ProjectParser::new().parse(dir.path()).unwrap_err();
        assert!(matches!(err, RadarError::Parser(_)));
    }

    #[test]
    fn derives_manifest_from_source_tree() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("checkout_agent.py"), "# agent").unwrap();
        std::fs::write(dir.path().join("test_checkout_agent.py"), "# test").unwrap();

        let project = ProjectParser::new().parse(dir.path()).unwrap();
        assert_eq!(project.agents.len(), 1);
        assert_eq!(project.agents[0].name, "checkout-agent");
        assert_eq!(
            project.metadata.get("manifest_generated"),
            Some(&Value::Bool(true))
        );
    }
}
