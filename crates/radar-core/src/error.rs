//! Crate-wide error type for the radar engine.

use thiserror::Error;

/// Core error type for `radar-core` operations.
///
/// This enum unifies the failure modes of the parser, the report builder and
/// the orchestrator. Individual detector failures are *not* represented here
/// — per the detector contract they are caught per-detector and converted
/// into a `DETECTOR-ERROR::<name>` finding instead of aborting a run.
#[derive(Error, Debug)]
pub enum RadarError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Project root does not exist, or a manifest could not be parsed
    #[error("parser error: {0}")]
    Parser(String),

    /// The configured object store failed to accept a written report
    #[error("object store error: {0}")]
    ObjectStore(#[from] radar_store::StoreError),

    /// An orchestrator run was cancelled before artifacts were written
    #[error("scan cancelled")]
    Cancelled,
}

/// Result type alias using [`RadarError`]
pub type Result<T> = std::result::Result<T, RadarError>;

/// Error returned by an individual [`crate::detectors::Detector`] run.
///
/// Per the detector contract this is never allowed to abort an orchestrator
/// run: the orchestrator catches it and converts it into a synthetic
/// `DETECTOR-ERROR::<name>` finding of severity `unknown`.
#[derive(Error, Debug, Clone)]
#[error("detector '{detector}' failed: {message}")]
pub struct DetectorError {
    /// Name of the detector that failed
    pub detector: String,
    /// Human-readable failure description
    pub message: String,
}

impl DetectorError {
    /// Construct a new detector error
    pub fn new(detector: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            detector: detector.into(),
            message: message.into(),
        }
    }
}
