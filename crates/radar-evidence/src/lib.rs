//! Evidence packager: bundles one or more report files plus optional logs
//! into a deterministic zip archive, suitable for audit archival, and hands
//! the archive off to an [`radar_store::ObjectStore`] when one is
//! configured.

#![warn(missing_docs)]

use chrono::{SecondsFormat, Utc};
use radar_store::ObjectStore;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Failure modes for evidence pack construction.
#[derive(Error, Debug)]
pub enum EvidencePackError {
    /// No findings file was supplied
    #[error("at least one findings file must be provided")]
    NoFindings,

    /// A supplied findings file does not exist
    #[error("findings file '{0}' does not exist")]
    MissingFindings(PathBuf),

    /// The supplied logs path exists as neither a file nor a directory
    #[error("logs path '{0}' does not exist")]
    MissingLogs(PathBuf),

    /// An IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip archive construction failed
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// JSON serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The configured object store failed to accept the built artifact
    #[error("object store error: {0}")]
    Store(#[from] radar_store::StoreError),
}

/// Result type alias using [`EvidencePackError`]
pub type Result<T> = std::result::Result<T, EvidencePackError>;

/// `metadata.json` contents embedded in every evidence pack.
#[derive(Debug, Clone, Serialize)]
pub struct EvidencePackMetadata {
    /// Always `"agentic-radar-evidence"`
    pub artifact_type: String,
    /// UTC RFC-3339 timestamp with trailing `Z`
    pub created_at: String,
    /// Archive entry names for packed findings files, in caller order
    pub findings: Vec<String>,
    /// Archive entry names for packed log files, in sorted relative-path order
    pub logs: Vec<String>,
    /// Trace identifiers attached to this evidence pack
    pub trace_ids: Vec<String>,
}

/// Outcome of building an evidence pack.
#[derive(Debug, Clone)]
pub struct EvidencePackResult {
    /// Local path of the built zip archive
    pub pack_path: PathBuf,
    /// The pack metadata embedded as `metadata.json`
    pub metadata: EvidencePackMetadata,
    /// Path the archive was additionally copied to, if an object store was configured
    pub stored_path: Option<PathBuf>,
}

/// Builds zip-based evidence packs combining findings and logs.
pub struct EvidencePackBuilder<'a> {
    object_store: Option<&'a dyn ObjectStore>,
}

impl<'a> Default for EvidencePackBuilder<'a> {
    fn default() -> Self {
        Self { object_store: None }
    }
}

impl<'a> EvidencePackBuilder<'a> {
    /// Build a packager with no object store configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an object store the finished archive is additionally copied into.
    pub fn with_object_store(mut self, store: &'a dyn ObjectStore) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Build a deterministic evidence pack. Archive entries are written in
    /// a fixed order: findings (caller order), logs (sorted relative-path
    /// order), then `metadata.json` last. Writes go to a temporary path and
    /// are renamed into place only on success, so a failed build never
    /// leaves a partial zip on disk.
    #[instrument(skip(self, findings_paths, trace_ids))]
    pub fn build(
        &self,
        findings_paths: &[PathBuf],
        logs_path: Option<&Path>,
        trace_ids: Vec<String>,
        output_path: Option<PathBuf>,
    ) -> Result<EvidencePackResult> {
        if findings_paths.is_empty() {
            return Err(EvidencePackError::NoFindings);
        }
        for path in findings_paths {
            if !path.exists() {
                return Err(EvidencePackError::MissingFindings(path.clone()));
            }
        }

        let output_path = output_path.unwrap_or_else(|| {
            findings_paths[0]
                .parent()
                .map(|p| p.join("evidence-pack.zip"))
                .unwrap_or_else(|| PathBuf::from("evidence-pack.zip"))
        });
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut metadata = EvidencePackMetadata {
            artifact_type: "agentic-radar-evidence".to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            findings: Vec::new(),
            logs: Vec::new(),
            trace_ids,
        };

        let tmp_path = output_path.with_extension("zip.tmp");
        if let Err(err) = self.write_archive(&tmp_path, findings_paths, logs_path, &mut metadata) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err);
        }
        std::fs::rename(&tmp_path, &output_path)?;
        info!("built evidence pack at {}", output_path.display());

        let stored_path = match self.object_store {
            Some(store) => {
                let name = output_path.file_name().and_then(|n| n.to_str());
                Some(store.put_file(&output_path, name)?)
            }
            None => None,
        };

        Ok(EvidencePackResult {
            pack_path: output_path,
            metadata,
            stored_path,
        })
    }

    fn write_archive(
        &self,
        tmp_path: &Path,
        findings_paths: &[PathBuf],
        logs_path: Option<&Path>,
        metadata: &mut EvidencePackMetadata,
    ) -> Result<()> {
        let file = std::fs::File::create(tmp_path)?;
        let mut archive = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for findings_path in findings_paths {
            let arcname = format!(
                "findings/{}",
                findings_path.file_name().and_then(|n| n.to_str()).unwrap_or("findings.json")
            );
            archive.start_file(&arcname, options)?;
            let bytes = std::fs::read(findings_path)?;
            archive.write_all(&bytes)?;
            metadata.findings.push(arcname);
        }

        if let Some(logs_path) = logs_path {
            if logs_path.is_dir() {
                let files = collect_log_files_ordered(logs_path);
                for file_path in files {
                    let relative = file_path.strip_prefix(logs_path).unwrap_or(&file_path);
                    let arcname = format!("logs/{}", relative.to_string_lossy().replace('\\', "/"));
                    archive.start_file(&arcname, options)?;
                    let bytes = std::fs::read(&file_path)?;
                    archive.write_all(&bytes)?;
                    metadata.logs.push(arcname);
                }
            } else if logs_path.is_file() {
                let arcname = format!(
                    "logs/{}",
                    logs_path.file_name().and_then(|n| n.to_str()).unwrap_or("log")
                );
                archive.start_file(&arcname, options)?;
                let bytes = std::fs::read(logs_path)?;
                archive.write_all(&bytes)?;
                metadata.logs.push(arcname);
            } else {
                return Err(EvidencePackError::MissingLogs(logs_path.to_path_buf()));
            }
        }

        archive.start_file("metadata.json", options)?;
        let json = serde_json::to_string_pretty(metadata)?;
        archive.write_all(json.as_bytes())?;

        archive.finish()?;
        Ok(())
    }
}

/// Walk a log directory the way `os.walk` + `sorted(files)` would: files in
/// the current directory (sorted by name) before descending into
/// subdirectories (also sorted by name, recursively). This puts shallower
/// files ahead of deeper ones, matching the packed `logs/` entry order the
/// format contractually produces (a top-level `radar.log` before a nested
/// `nested/audit.log`) rather than a plain lexicographic path sort.
fn collect_log_files_ordered(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<_> = match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).collect(),
        Err(_) => return Vec::new(),
    };
    entries.sort_by_key(|e| e.file_name());

    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if path.is_file() {
            files.push(path);
        }
    }
    for subdir in subdirs {
        files.extend(collect_log_files_ordered(&subdir));
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zip::ZipArchive;

    #[test]
    fn build_requires_at_least_one_findings_file() {
        let builder = EvidencePackBuilder::new();
        let err = builder.build(&[], None, vec![], None).unwrap_err();
        assert!(matches!(err, EvidencePackError::NoFindings));
    }

    #[test]
    fn missing_findings_file_is_an_error() {
        let builder = EvidencePackBuilder::new();
        let err = builder
            .build(&[PathBuf::from("/does/not/exist.json")], None, vec![], None)
            .unwrap_err();
        assert!(matches!(err, EvidencePackError::MissingFindings(_)));
    }

    #[test]
    fn pack_contents_in_deterministic_order() {
        let dir = TempDir::new().unwrap();
        let findings_path = dir.path().join("report.json");
        std::fs::write(&findings_path, "{}").unwrap();

        let logs_dir = dir.path().join("logs");
        std::fs::create_dir_all(logs_dir.join("nested")).unwrap();
        std::fs::write(logs_dir.join("radar.log"), "log-a").unwrap();
        std::fs::write(logs_dir.join("nested/audit.log"), "log-b").unwrap();

        let builder = EvidencePackBuilder::new();
        let result = builder
            .build(&[findings_path], Some(&logs_dir), vec!["trace-1".into()], None)
            .unwrap();

        assert_eq!(result.metadata.findings, vec!["findings/report.json".to_string()]);
        assert_eq!(
            result.metadata.logs,
            vec!["logs/radar.log".to_string(), "logs/nested/audit.log".to_string()]
        );

        let file = std::fs::File::open(&result.pack_path).unwrap();
        let mut archive = ZipArchive::new(file).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "findings/report.json".to_string(),
                "logs/radar.log".to_string(),
                "logs/nested/audit.log".to_string(),
                "metadata.json".to_string(),
            ]
        );
    }

    #[test]
    fn missing_logs_path_is_an_error_and_leaves_no_partial_zip() {
        let dir = TempDir::new().unwrap();
        let findings_path = dir.path().join("report.json");
        std::fs::write(&findings_path, "{}").unwrap();

        let builder = EvidencePackBuilder::new();
        let err = builder
            .build(&[findings_path], Some(&dir.path().join("missing-logs")), vec![], None)
            .unwrap_err();
        assert!(matches!(err, EvidencePackError::MissingLogs(_)));
        assert!(!dir.path().join("evidence-pack.zip").exists());
        assert!(!dir.path().join("evidence-pack.zip.tmp").exists());
    }

    #[test]
    fn default_output_path_is_sibling_of_first_findings_file() {
        let dir = TempDir::new().unwrap();
        let findings_path = dir.path().join("report.json");
        std::fs::write(&findings_path, "{}").unwrap();

        let builder = EvidencePackBuilder::new();
        let result = builder.build(&[findings_path], None, vec![], None).unwrap();
        assert_eq!(result.pack_path, dir.path().join("evidence-pack.zip"));
    }
}
