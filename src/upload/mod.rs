//! Upload module
//!
//! Batch upload of a local folder into a bucket: enumerate candidates, run
//! one worker per file against a shared quota, and aggregate every outcome.

use crate::s3::StorageError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod aggregator;
pub mod dependency;
pub mod enumerator;
pub mod orchestrator;
pub mod policy;
pub mod quota;

pub use aggregator::RunReport;
pub use dependency::DependencyGraph;
pub use enumerator::enumerate_candidates;
pub use orchestrator::Uploader;
pub use policy::SizePolicy;
pub use quota::QuotaAccountant;

const MIB: u64 = 1024 * 1024;

/// A local file eligible for upload.
///
/// The object key is the file's base name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    path: PathBuf,
    key: String,
    size: u64,
}

impl Candidate {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
            size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Size observed at enumeration time
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Why a single candidate was not uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Open,
    Stat,
    BelowMinimumSize,
    QuotaExceeded,
    DependencyFailed,
    Transfer,
    /// The worker panicked or was cancelled before reporting
    Aborted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Open => "open",
            FailureKind::Stat => "stat",
            FailureKind::BelowMinimumSize => "below_minimum_size",
            FailureKind::QuotaExceeded => "quota_exceeded",
            FailureKind::DependencyFailed => "dependency_failed",
            FailureKind::Transfer => "transfer",
            FailureKind::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file upload errors. Contained to the worker that produced them.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File {path} is {size} bytes, smaller than the {min} byte minimum")]
    BelowMinimumSize { path: PathBuf, size: u64, min: u64 },

    #[error("Uploading {path} ({size} bytes) would exceed the {ceiling} byte bucket limit")]
    QuotaExceeded {
        path: PathBuf,
        size: u64,
        ceiling: u64,
    },

    #[error("Dependency of {key} not satisfied: {reason}")]
    DependencyFailed { key: String, reason: String },

    #[error("Upload failed for {key}: {source}")]
    Transfer {
        key: String,
        #[source]
        source: StorageError,
    },
}

impl UploadError {
    pub fn kind(&self) -> FailureKind {
        match self {
            UploadError::Open { .. } => FailureKind::Open,
            UploadError::Stat { .. } => FailureKind::Stat,
            UploadError::BelowMinimumSize { .. } => FailureKind::BelowMinimumSize,
            UploadError::QuotaExceeded { .. } => FailureKind::QuotaExceeded,
            UploadError::DependencyFailed { .. } => FailureKind::DependencyFailed,
            UploadError::Transfer { .. } => FailureKind::Transfer,
        }
    }
}

/// Run-level errors
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Failed to read files folder {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Found {found} files, at least {required} are required")]
    Preflight { found: usize, required: usize },

    #[error("Failed to calculate current bucket size: {0}")]
    SizeQuery(#[source] StorageError),

    #[error("Invalid dependency: {0}")]
    InvalidDependency(String),

    #[error("Object key {0} appears more than once in the batch")]
    DuplicateKey(String),

    #[error("Some uploads failed ({failed} of {total})")]
    SomeUploadsFailed { failed: usize, total: usize },
}

/// Result of one candidate's worker. Exactly one per candidate per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success {
        candidate: Candidate,
        bytes_written: u64,
    },
    Failure {
        kind: FailureKind,
        candidate: Candidate,
        detail: String,
    },
}

impl TaskOutcome {
    pub fn from_result(candidate: Candidate, result: Result<u64, UploadError>) -> Self {
        match result {
            Ok(bytes_written) => TaskOutcome::Success {
                candidate,
                bytes_written,
            },
            Err(err) => TaskOutcome::Failure {
                kind: err.kind(),
                candidate,
                detail: err.to_string(),
            },
        }
    }

    pub fn candidate(&self) -> &Candidate {
        match self {
            TaskOutcome::Success { candidate, .. } | TaskOutcome::Failure { candidate, .. } => {
                candidate
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }

    /// Failure kind, `None` on success
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            TaskOutcome::Success { .. } => None,
            TaskOutcome::Failure { kind, .. } => Some(*kind),
        }
    }
}
