//! Language-agnostic source walker plus the lexical tool/MCP visitors used
//! to discover tool definitions and MCP endpoints directly from source and
//! configuration files.
//!
//! The original implementation walks a real Python AST; a systems-language
//! rewrite re-architects that into a small lexical visitor over a minimal
//! statement model (decorator-like prefix lines, class declarations with a
//! base list, assignment statements whose right-hand side is a call) rather
//! than embedding a full language grammar, per the project's redesign notes.
//! This walker is a standalone capability — the default detector pipeline
//! (see [`crate::detectors`]) operates on the manifest-derived
//! [`crate::model::ParsedProject`] and does not call it, mirroring the
//! original's own separation between `detectors.py` (wired into the default
//! run) and `detectors/tools.py` + `detectors/mcp.py` (a separate static
//! analysis capability).

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;
use walkdir::WalkDir;

const TOOL_DECORATOR_KEYWORDS: &[&str] = &["tool", "register_tool", "langchain.tool", "lc_tool"];
const TOOL_CLASS_SUFFIXES: &[&str] = &["Tool", "BaseTool"];
const TOOL_CALL_KEYWORDS: &[&str] = &["Tool", "StructuredTool", "PythonREPLTool", "BaseTool"];
const ENDPOINT_KEYS: &[&str] = &["uri", "url", "endpoint", "server", "server_url", "base_url", "address"];
const CAPABILITY_KEYS: &[&str] = &["capabilities", "tools", "permissions"];

/// Walks a set of paths, yielding files matching a fixed extension set.
pub struct SourceWalker {
    extensions: Option<HashSet<String>>,
}

impl SourceWalker {
    /// A walker with no extension filter (every file is visited).
    pub fn unfiltered() -> Self {
        Self { extensions: None }
    }

    /// A walker restricted to the given extensions (without leading dots).
    pub fn with_extensions(extensions: &[&str]) -> Self {
        Self {
            extensions: Some(extensions.iter().map(|e| e.to_lowercase()).collect()),
        }
    }

    fn should_include(&self, path: &Path) -> bool {
        match &self.extensions {
            None => true,
            Some(exts) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| exts.contains(&e.to_lowercase()))
                .unwrap_or(false),
        }
    }

    /// Yield every file under `paths` that matches the configured extension
    /// filter: directories are walked recursively, files are yielded as-is.
    pub fn iter_files<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for raw in paths {
            let path = raw.as_ref();
            if path.is_dir() {
                for entry in WalkDir::new(path).follow_links(false) {
                    let Ok(entry) = entry else { continue };
                    if entry.path().is_file() && self.should_include(entry.path()) {
                        files.push(entry.path().to_path_buf());
                    }
                }
            } else if path.is_file() && self.should_include(path) {
                files.push(path.to_path_buf());
            }
        }
        files
    }
}

/// The three shapes a tool definition can take in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFindingKind {
    /// A decorated function/coroutine definition
    Function,
    /// A class whose base list includes a tool-ish suffix
    Class,
    /// An assignment whose right-hand side calls a tool-ish constructor
    Assignment,
}

/// A tool definition discovered by [`ToolWalker`].
#[derive(Debug, Clone)]
pub struct ToolFinding {
    /// Which syntactic shape matched
    pub kind: ToolFindingKind,
    /// Name of the function/class/assignment target
    pub name: String,
    /// `file:line` location string
    pub location: String,
    /// Shape-specific metadata (decorators/docstring, bases, call/keywords)
    pub metadata: Map<String, Value>,
}

/// Discovers tool definitions in source files via a lexical visitor.
pub struct ToolWalker {
    walker: SourceWalker,
}

impl ToolWalker {
    /// Build a walker restricted to the given extension (default `py`).
    pub fn new(extension: &str) -> Self {
        Self {
            walker: SourceWalker::with_extensions(&[extension]),
        }
    }

    /// Scan every matching file under `paths` for tool definitions.
    pub fn scan_paths<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<ToolFinding> {
        self.walker
            .iter_files(paths)
            .into_iter()
            .flat_map(|path| scan_tool_file(&path))
            .collect()
    }
}

fn scan_tool_file(path: &Path) -> Vec<ToolFinding> {
    let Ok(source) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut findings = Vec::new();
    let mut pending_decorators: Vec<String> = Vec::new();

    let lines: Vec<&str> = source.lines().collect();
    for (idx, raw_line) in lines.iter().enumerate() {
        let line = raw_line.trim();
        let lineno = idx + 1;

        if let Some(name) = decorator_name(line) {
            pending_decorators.push(name);
            continue;
        }

        if let Some(func_name) = function_def_name(line) {
            if pending_decorators
                .iter()
                .any(|d| is_tool_decorator(d))
            {
                let mut metadata = Map::new();
                metadata.insert(
                    "decorators".into(),
                    Value::Array(pending_decorators.iter().cloned().map(Value::String).collect()),
                );
                metadata.insert(
                    "docstring".into(),
                    docstring_after(&lines, idx).map(Value::String).unwrap_or(Value::Null),
                );
                findings.push(ToolFinding {
                    kind: ToolFindingKind::Function,
                    name: func_name,
                    location: format!("{}:{lineno}", path.display()),
                    metadata,
                });
            }
            pending_decorators.clear();
            continue;
        }

        if !line.starts_with('@') {
            pending_decorators.clear();
        }

        if let Some((class_name, bases)) = class_def(line) {
            if bases.iter().any(|b| is_tool_class(b)) {
                let mut metadata = Map::new();
                metadata.insert(
                    "bases".into(),
                    Value::Array(bases.into_iter().map(Value::String).collect()),
                );
                findings.push(ToolFinding {
                    kind: ToolFindingKind::Class,
                    name: class_name,
                    location: format!("{}:{lineno}", path.display()),
                    metadata,
                });
            }
            continue;
        }

        if let Some((targets, call_name, keywords)) = call_assignment(line) {
            if is_tool_call(&call_name) {
                let mut metadata = Map::new();
                metadata.insert("call".into(), Value::String(call_name.clone()));
                let kw_map: Map<String, Value> = keywords
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                metadata.insert("keywords".into(), Value::Object(kw_map));
                let name = if targets.is_empty() {
                    call_name
                } else {
                    targets.join(", ")
                };
                findings.push(ToolFinding {
                    kind: ToolFindingKind::Assignment,
                    name,
                    location: format!("{}:{lineno}", path.display()),
                    metadata,
                });
            }
        }
    }
    findings
}

fn decorator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@([A-Za-z_][A-Za-z0-9_\.]*)").unwrap())
}

fn decorator_name(line: &str) -> Option<String> {
    decorator_regex().captures(line).map(|c| c[1].to_string())
}

fn function_def_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap())
}

fn function_def_name(line: &str) -> Option<String> {
    function_def_regex().captures(line).map(|c| c[1].to_string())
}

fn class_def_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^class\s+([A-Za-z_][A-Za-z0-9_]*)\s*(?:\(([^)]*)\))?\s*:").unwrap()
    })
}

fn class_def(line: &str) -> Option<(String, Vec<String>)> {
    let caps = class_def_regex().captures(line)?;
    let name = caps[1].to_string();
    let bases = caps
        .get(2)
        .map(|m| {
            m.as_str()
                .split(',')
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect()
        })
        .unwrap_or_default();
    Some((name, bases))
}

fn assignment_call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^([A-Za-z_][A-Za-z0-9_]*(?:\s*,\s*[A-Za-z_][A-Za-z0-9_]*)*)\s*(?::[^=]+)?=\s*([A-Za-z_][A-Za-z0-9_\.]*)\s*\(([^)]*)\)\s*$",
        )
        .unwrap()
    })
}

fn call_assignment(line: &str) -> Option<(Vec<String>, String, Vec<(String, String)>)> {
    let caps = assignment_call_regex().captures(line)?;
    let targets = caps[1]
        .split(',')
        .map(|t| t.trim().to_string())
        .collect();
    let call_name = caps[2].to_string();
    let args = &caps[3];
    let keywords = parse_keyword_args(args);
    Some((targets, call_name, keywords))
}

fn parse_keyword_args(args: &str) -> Vec<(String, String)> {
    let kw_regex = {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)\s*=\s*("([^"]*)"|'([^']*)'|[^,]+)"#).unwrap()
        })
    };
    kw_regex
        .captures_iter(args)
        .map(|c| {
            let key = c[1].to_string();
            let value = c
                .get(3)
                .or_else(|| c.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| c[2].trim().to_string());
            (key, value)
        })
        .collect()
}

fn docstring_after(lines: &[&str], def_idx: usize) -> Option<String> {
    let next = lines.get(def_idx + 1)?.trim();
    if let Some(stripped) = next.strip_prefix("\"\"\"").or_else(|| next.strip_prefix("'''")) {
        let stripped = stripped
            .trim_end_matches("\"\"\"")
            .trim_end_matches("'''")
            .trim();
        if !stripped.is_empty() {
            return Some(stripped.to_string());
        }
    }
    None
}

fn is_tool_decorator(name: &str) -> bool {
    let lower = name.to_lowercase();
    TOOL_DECORATOR_KEYWORDS
        .iter()
        .any(|kw| lower.ends_with(kw) || lower.contains(kw))
}

fn is_tool_class(name: &str) -> bool {
    TOOL_CLASS_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

fn is_tool_call(name: &str) -> bool {
    let base = name.rsplit('.').next().unwrap_or(name);
    if TOOL_CALL_KEYWORDS.contains(&base) {
        return true;
    }
    base.to_lowercase().ends_with("tool")
}

/// An MCP server or client reference discovered by [`McpWalker`].
#[derive(Debug, Clone)]
pub struct MCPServerFinding {
    /// Name (call target, config key, or `"mcp_endpoint"` for regex fallback matches)
    pub name: String,
    /// Endpoint, when extracted
    pub endpoint: Option<String>,
    /// `file:line` or plain file location string
    pub location: String,
    /// Shape-specific metadata
    pub metadata: Map<String, Value>,
}

/// Discovers MCP server references across source and configuration files.
pub struct McpWalker {
    walker: SourceWalker,
}

impl Default for McpWalker {
    fn default() -> Self {
        Self::new("py")
    }
}

impl McpWalker {
    /// Build a walker over the given source extension plus JSON/YAML config
    /// files.
    pub fn new(source_extension: &str) -> Self {
        let exts: Vec<&str> = vec![source_extension, "json", "yaml", "yml"];
        Self {
            walker: SourceWalker::with_extensions(&exts),
        }
    }

    /// Scan every matching file under `paths` for MCP references.
    pub fn scan_paths<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<MCPServerFinding> {
        self.walker
            .iter_files(paths)
            .into_iter()
            .flat_map(|path| scan_mcp_file(&path))
            .collect()
    }
}

fn scan_mcp_file(path: &Path) -> Vec<MCPServerFinding> {
    let suffix = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match suffix.as_str() {
        "json" | "yaml" | "yml" => scan_mcp_config(path, &suffix),
        _ => scan_mcp_source(path),
    }
}

fn mcp_call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_\.]*)\s*\(([^)]*)\)").unwrap())
}

fn scan_mcp_source(path: &Path) -> Vec<MCPServerFinding> {
    let Ok(source) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut findings = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        for caps in mcp_call_regex().captures_iter(line) {
            let call_name = caps[1].to_string();
            if !looks_like_mcp(&call_name) {
                continue;
            }
            let args = &caps[2];
            let keywords = parse_keyword_args(args);
            let endpoint = extract_endpoint_from_keywords(&keywords, args);
            let capabilities = extract_capabilities_from_keywords(args);
            let mut metadata = Map::new();
            metadata.insert("call".into(), Value::String(call_name.clone()));
            metadata.insert(
                "capabilities".into(),
                Value::Array(capabilities.into_iter().map(Value::String).collect()),
            );
            findings.push(MCPServerFinding {
                name: call_name.rsplit('.').next().unwrap_or("mcp").to_string(),
                endpoint,
                location: format!("{}:{}", path.display(), idx + 1),
                metadata,
            });
        }
    }
    findings
}

fn looks_like_mcp(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("mcp") || lower.contains("modelcontext") || lower.contains("model_context")
}

fn extract_endpoint_from_keywords(keywords: &[(String, String)], raw_args: &str) -> Option<String> {
    for (key, value) in keywords {
        if ENDPOINT_KEYS.contains(&key.to_lowercase().as_str()) {
            return Some(value.clone());
        }
    }
    // Fall back to the first positional string literal.
    let literal_regex = {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r#"^\s*"([^"]*)"|^\s*'([^']*)'"#).unwrap())
    };
    literal_regex
        .captures(raw_args)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
}

fn extract_capabilities_from_keywords(raw_args: &str) -> Vec<String> {
    let list_regex = {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r"(?i)(?:capabilities|tools|permissions)\s*=\s*\[([^\]]*)\]").unwrap()
        })
    };
    let Some(caps) = list_regex.captures(raw_args) else {
        return Vec::new();
    };
    let literal_regex = {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r#""([^"]*)"|'([^']*)'"#).unwrap())
    };
    literal_regex
        .captures_iter(&caps[1])
        .map(|c| c.get(1).or_else(|| c.get(2)).map(|m| m.as_str().to_string()).unwrap_or_default())
        .filter(|s| !s.is_empty())
        .collect()
}

fn scan_mcp_config(path: &Path, suffix: &str) -> Vec<MCPServerFinding> {
    let Ok(text) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let value: Option<Value> = if suffix == "json" {
        serde_json::from_str(&text).ok()
    } else {
        serde_yaml::from_str::<serde_yaml::Value>(&text)
            .ok()
            .and_then(|v| serde_json::to_value(v).ok())
    };

    match value {
        Some(value) => {
            let mut visited = HashSet::new();
            let mut entries = Vec::new();
            find_mcp_in_value(&value, &mut Vec::new(), &mut visited, &mut entries);
            entries
                .into_iter()
                .map(|entry| MCPServerFinding {
                    name: entry
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("mcp_server")
                        .to_string(),
                    endpoint: entry.get("endpoint").and_then(Value::as_str).map(str::to_string),
                    location: path.display().to_string(),
                    metadata: entry,
                })
                .collect()
        }
        None => {
            debug!("falling back to raw-text MCP scan for {}", path.display());
            scan_text_for_mcp(&text, path)
        }
    }
}

/// Recursively search a parsed config tree for MCP-ish map nodes. Node
/// identities are tracked so that even if an implementation's YAML loader
/// produced cyclic anchors, the walk would terminate rather than loop
/// forever; parsed JSON/YAML values are acyclic in practice, so this is
/// defensive symmetry with the spec's cycle-safety requirement.
fn find_mcp_in_value(
    node: &Value,
    trail: &mut Vec<String>,
    visited: &mut HashSet<usize>,
    out: &mut Vec<Map<String, Value>>,
) {
    let identity = node as *const Value as usize;
    if !visited.insert(identity) {
        return;
    }

    match node {
        Value::Object(map) => {
            let is_mcp = map.keys().any(|k| k.to_lowercase().contains("mcp"));
            let endpoint_key = map.keys().find(|k| ENDPOINT_KEYS.contains(&k.to_lowercase().as_str()));
            let endpoint = endpoint_key.and_then(|k| map.get(k)).and_then(Value::as_str);

            if is_mcp || endpoint.is_some() {
                let mut entry = Map::new();
                let name = map
                    .get("name")
                    .and_then(Value::as_str)
                    .or_else(|| map.get("id").and_then(Value::as_str))
                    .map(str::to_string)
                    .unwrap_or_else(|| if trail.is_empty() { "mcp".to_string() } else { trail.join(".") });
                entry.insert("name".into(), Value::String(name));
                if let Some(endpoint) = endpoint {
                    entry.insert("endpoint".into(), Value::String(endpoint.to_string()));
                }
                for key in map.keys() {
                    if CAPABILITY_KEYS.contains(&key.to_lowercase().as_str()) {
                        if let Some(Value::Array(items)) = map.get(key) {
                            entry.insert(key.clone(), Value::Array(items.clone()));
                        }
                    }
                }
                out.push(entry);
            }

            for (key, value) in map {
                trail.push(key.clone());
                find_mcp_in_value(value, trail, visited, out);
                trail.pop();
            }
        }
        Value::Array(items) => {
            for (idx, value) in items.iter().enumerate() {
                trail.push(idx.to_string());
                find_mcp_in_value(value, trail, visited, out);
                trail.pop();
            }
        }
        _ => {}
    }
}

fn mcp_text_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(mcp|https?)://[^\s'"]+"#).unwrap())
}

fn scan_text_for_mcp(text: &str, path: &Path) -> Vec<MCPServerFinding> {
    mcp_text_regex()
        .find_iter(text)
        .map(|m| {
            let mut metadata = Map::new();
            metadata.insert("extracted_from".into(), Value::String("text".into()));
            MCPServerFinding {
                name: "mcp_endpoint".to_string(),
                endpoint: Some(m.as_str().to_string()),
                location: format!("{}:?", path.display()),
                metadata,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn detects_decorated_tool_function() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("tools.py");
        std::fs::write(&file, "@tool\ndef search(query: str) -> str:\n    \"\"\"Search the web.\"\"\"\n    return query\n").unwrap();

        let findings = ToolWalker::new("py").scan_paths(&[dir.path()]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, ToolFindingKind::Function);
        assert_eq!(findings[0].name, "search");
    }

    #[test]
    fn detects_tool_base_class() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("tools.py");
        std::fs::write(&file, "class SearchTool(BaseTool):\n    pass\n").unwrap();

        let findings = ToolWalker::new("py").scan_paths(&[dir.path()]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, ToolFindingKind::Class);
        assert_eq!(findings[0].name, "SearchTool");
    }

    #[test]
    fn detects_tool_call_assignment() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("tools.py");
        std::fs::write(&file, "search = StructuredTool(name=\"search\")\n").unwrap();

        let findings = ToolWalker::new("py").scan_paths(&[dir.path()]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, ToolFindingKind::Assignment);
    }

    #[test]
    fn detects_mcp_call_endpoint_and_capabilities() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("client.py");
        std::fs::write(
            &file,
            "client = MCPClient(endpoint=\"https://mcp.example.com\", capabilities=[\"read\", \"write\"])\n",
        )
        .unwrap();

        let findings = McpWalker::new("py").scan_paths(&[dir.path()]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].endpoint.as_deref(), Some("https://mcp.example.com"));
    }

    #[test]
    fn detects_mcp_in_json_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(
            &file,
            r#"{"mcp_servers": {"inventory": {"endpoint": "https://inv", "capabilities": ["read"]}}}"#,
        )
        .unwrap();

        let findings = McpWalker::new("py").scan_paths(&[dir.path()]);
        assert!(!findings.is_empty());
    }

    #[test]
    fn falls_back_to_regex_scan_on_malformed_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(&file, "not actually json, but mentions mcp://broker.local/x").unwrap();

        let findings = McpWalker::new("py").scan_paths(&[dir.path()]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].endpoint.as_deref(), Some("mcp://broker.local/x"));
    }
}
