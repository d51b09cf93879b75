//! Error types for the WhiteboxTools runner
//!
//! Every failure in the orchestration pipeline maps to one variant here so
//! callers can distinguish provisioning, staging, invocation and collection
//! problems without string matching.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the WhiteboxTools orchestration pipeline
#[derive(Error, Debug)]
pub enum WbtError {
    /// The running OS/architecture has no published WhiteboxTools bundle
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// Bundle download failed (network-level)
    #[error("Failed to download WhiteboxTools from {url}: {source}")]
    Download {
        url: String,
        source: reqwest::Error,
    },

    /// Downloaded archive could not be read or did not contain the payload
    #[error("Invalid WhiteboxTools archive: {0}")]
    Archive(String),

    /// Download-extract-verify cycle exhausted all attempts
    #[error("Failed to prepare WhiteboxTools after {attempts} attempts")]
    Provisioning { attempts: u32 },

    /// The executable could not be started at all
    #[error("Failed to launch WhiteboxTools executable {exe}: {reason}")]
    Launch { exe: PathBuf, reason: String },

    /// A specific tool invocation exited with a non-success status
    #[error("Tool `{tool}` (invocation {index}) failed with exit code {code:?}:\n{stderr}")]
    Invocation {
        tool: String,
        index: usize,
        code: Option<i32>,
        stderr: String,
    },

    /// Requested input files were not found in the source directory
    #[error("Input file(s) not found in source directory: {}", .missing.join(", "))]
    Staging { missing: Vec<String> },

    /// Requested output files were never produced by any invocation
    #[error("Output file(s) to save not found in workspace: {}", .missing.join(", "))]
    Collection { missing: Vec<String> },

    /// Run configuration errors (CLI front-end)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors (tool parameter introspection)
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, WbtError>;

impl WbtError {
    /// Whether this failure suggests a corrupted installation rather than a
    /// tool-logic error. Only these trigger the one re-provisioning retry.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, WbtError::Launch { .. })
    }
}
