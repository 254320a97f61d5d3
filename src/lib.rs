//! Quota Uploadr Library
//!
//! Concurrent batch uploader for S3-compatible buckets.
//!
//! # Features
//!
//! - **Concurrent**: One worker per file, optionally bounded
//! - **Quota Aware**: Per-file minimum size and an aggregate bucket ceiling
//!   that counts every stored object version
//! - **Ordered When Asked**: Configurable "upload B only after A" edges
//! - **Full Accounting**: Exactly one outcome per file, aggregated into a
//!   single verdict plus a per-file report
//!
//! # Example
//!
//! ```no_run
//! use quota_uploadr::config::Config;
//! use quota_uploadr::s3::{CredentialsProvider, S3Client, S3ClientConfig};
//! use quota_uploadr::upload::Uploader;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let credentials = CredentialsProvider::resolve(&config.storage)?;
//!     let client = S3Client::connect(S3ClientConfig {
//!         endpoint: config.storage.endpoint.clone(),
//!         region: config.storage.region.clone(),
//!         force_path_style: config.storage.force_path_style,
//!         credentials,
//!     })
//!     .await;
//!
//!     let bucket = quota_uploadr::bucket::resolve_bucket_name(&config.bucket);
//!     quota_uploadr::bucket::ensure_bucket(&client, &bucket).await?;
//!
//!     let uploader = Uploader::new(Arc::new(client), bucket, config.upload.size_policy());
//!     let report = uploader.upload_folder(&config.upload.source_dir).await?;
//!     report.combined()?;
//!     Ok(())
//! }
//! ```

pub mod bucket;
pub mod config;
pub mod download;
pub mod logging;
pub mod metrics;
pub mod s3;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use upload::{RunReport, Uploader};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
