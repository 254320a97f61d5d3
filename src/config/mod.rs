//! Configuration module for Quota Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. Every section has defaults,
//! so the uploader runs without any file at all.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::upload::dependency::DependencyGraph;
use crate::upload::policy::{MAX_AGGREGATE_SIZE, MIN_CANDIDATES, MIN_FILE_SIZE};
use crate::upload::SizePolicy;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub bucket: BucketConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_http_url(&self.storage.endpoint) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid storage endpoint '{}': must start with http:// or https://",
                self.storage.endpoint
            )));
        }

        if self.storage.region.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Storage region cannot be empty".into(),
            ));
        }

        if self.bucket.name.is_none() && self.bucket.team.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Either bucket.name or bucket.team must be set".into(),
            ));
        }

        let upload = &self.upload;
        if upload.min_files == 0 {
            return Err(ConfigError::ValidationError(
                "upload.min_files must be at least 1".into(),
            ));
        }

        if upload.max_bucket_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_bucket_size must be greater than zero".into(),
            ));
        }

        if upload.min_file_size > upload.max_bucket_size {
            return Err(ConfigError::ValidationError(format!(
                "upload.min_file_size ({}) exceeds upload.max_bucket_size ({})",
                upload.min_file_size, upload.max_bucket_size
            )));
        }

        if upload.max_concurrency == Some(0) {
            return Err(ConfigError::ValidationError(
                "upload.max_concurrency must be greater than zero when set".into(),
            ));
        }

        upload
            .dependency_graph()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(())
    }
}

/// S3-compatible endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_force_path_style")]
    pub force_path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            region: default_region(),
            access_key: None,
            secret_key: None,
            force_path_style: default_force_path_style(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:9000".to_string()
}

fn default_region() -> String {
    "eu-west-4".to_string()
}

fn default_force_path_style() -> bool {
    true
}

/// Destination bucket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Team prefix used to derive the dated bucket name
    #[serde(default = "default_team")]
    pub team: String,
    /// Explicit bucket name; overrides the dated name
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            team: default_team(),
            name: None,
        }
    }
}

fn default_team() -> String {
    "cs-team".to_string()
}

/// One ordering edge: `dependent` is uploaded only after `producer` completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRule {
    pub producer: String,
    pub dependent: String,
}

/// Upload batch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_min_file_size")]
    pub min_file_size: u64,
    #[serde(default = "default_max_bucket_size")]
    pub max_bucket_size: u64,
    #[serde(default = "default_min_files")]
    pub min_files: usize,
    /// Upper bound on simultaneously transferring workers; unbounded when unset
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Upper bound on how long a dependent waits for its producers
    #[serde(default)]
    pub dependency_timeout_secs: Option<u64>,
    #[serde(default)]
    pub dependencies: Vec<DependencyRule>,
}

impl UploadConfig {
    /// Size policy described by this section
    pub fn size_policy(&self) -> SizePolicy {
        SizePolicy {
            min_file_size: self.min_file_size,
            max_aggregate_size: self.max_bucket_size,
            min_candidates: self.min_files,
        }
    }

    /// Ordering graph built from `dependencies`
    pub fn dependency_graph(&self) -> Result<DependencyGraph, crate::upload::BatchError> {
        DependencyGraph::from_rules(&self.dependencies)
    }

    pub fn dependency_timeout(&self) -> Option<Duration> {
        self.dependency_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            min_file_size: default_min_file_size(),
            max_bucket_size: default_max_bucket_size(),
            min_files: default_min_files(),
            max_concurrency: None,
            dependency_timeout_secs: None,
            dependencies: Vec::new(),
        }
    }
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("../files")
}

fn default_min_file_size() -> u64 {
    MIN_FILE_SIZE
}

fn default_max_bucket_size() -> u64 {
    MAX_AGGREGATE_SIZE
}

fn default_min_files() -> usize {
    MIN_CANDIDATES
}

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_dest_dir")]
    pub dest_dir: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dest_dir: default_dest_dir(),
        }
    }
}

fn default_dest_dir() -> PathBuf {
    PathBuf::from("../downloads")
}
