//! S3 Client module
//!
//! Thin wrapper over the AWS SDK for S3-compatible endpoints (MinIO, AWS).
//! The uploader only talks to storage through the [`ObjectStore`] and
//! [`BucketAdmin`] traits, so everything above this module can be exercised
//! against in-memory fakes.
//!
//! # Example
//!
//! ```no_run
//! use quota_uploadr::s3::{Credentials, ObjectStore, S3Client, S3ClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = S3ClientConfig {
//!     endpoint: "http://localhost:9000".to_string(),
//!     region: "eu-west-4".to_string(),
//!     force_path_style: true,
//!     credentials: Credentials::new("minioadmin", "minioadmin"),
//! };
//!
//! let client = S3Client::connect(config).await;
//! let total = client.total_stored_bytes("cs-team-20250101").await?;
//! println!("bucket holds {} bytes across all versions", total);
//! # Ok(())
//! # }
//! ```
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | PutObject | `s3.put_object` | bucket, key, bytes |
//! | GetObject | `s3.get_object` | bucket, key, bytes_written |
//! | ListObjectVersions | `s3.list_object_versions` | bucket, versions, total_bytes |
//! | HeadBucket | `s3.head_bucket` | bucket |
//! | CreateBucket | `s3.create_bucket` | bucket, region |
//! | PutBucketVersioning | `s3.put_bucket_versioning` | bucket |

mod credentials;

pub use credentials::{
    Credentials, CredentialsError, CredentialsProvider, ACCESS_KEY_ENV, SECRET_KEY_ENV,
};

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration,
    VersioningConfiguration,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{operation} failed: {message}")]
    RequestError {
        operation: &'static str,
        message: String,
    },

    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Failed to read request body: {0}")]
    BodyError(String),

    #[error("I/O error on {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn request(operation: &'static str, err: impl std::error::Error) -> Self {
        Self::RequestError {
            operation,
            message: DisplayErrorContext(&err).to_string(),
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Object transfer and destination size query
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `file` (exactly `size` bytes) under `key`, returning bytes written.
    ///
    /// On a versioned bucket this stores a new version of the key.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        file: File,
        size: u64,
    ) -> Result<u64, StorageError>;

    /// Stream `key` into the local file at `dest`, returning bytes written.
    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
    ) -> Result<u64, StorageError>;

    /// Sum of the sizes of every stored version of every object in `bucket`.
    async fn total_stored_bytes(&self, bucket: &str) -> Result<u64, StorageError>;
}

/// Bucket lifecycle operations
#[async_trait]
pub trait BucketAdmin: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    async fn enable_versioning(&self, bucket: &str) -> Result<(), StorageError>;
}

/// S3 Client configuration
#[derive(Debug, Clone)]
pub struct S3ClientConfig {
    pub endpoint: String,
    pub region: String,
    pub force_path_style: bool,
    pub credentials: Credentials,
}

/// S3 Client
#[derive(Debug, Clone)]
pub struct S3Client {
    client: aws_sdk_s3::Client,
    region: String,
}

impl S3Client {
    /// Build a client for a single endpoint with static credentials.
    ///
    /// SDK retries are disabled: a failed request surfaces immediately as a
    /// [`StorageError`].
    pub async fn connect(config: S3ClientConfig) -> Self {
        let credentials = aws_credential_types::Credentials::new(
            config.credentials.access_key_id(),
            config.credentials.secret_access_key(),
            None,
            None,
            "quota-uploadr",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(&config.endpoint)
            .force_path_style(config.force_path_style)
            .build();

        tracing::debug!(
            endpoint = %config.endpoint,
            region = %config.region,
            path_style = config.force_path_style,
            "S3 client configured"
        );

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            region: config.region,
        }
    }

    /// Get the region
    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    #[tracing::instrument(
        name = "s3.put_object",
        skip(self, file),
        fields(s3.bucket = %bucket, s3.key = %key, upload.bytes = size),
        err
    )]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        file: File,
        size: u64,
    ) -> Result<u64, StorageError> {
        let body = ByteStream::read_from()
            .file(file)
            .build()
            .await
            .map_err(|e| StorageError::BodyError(e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::request("PutObject", e))?;

        Ok(size)
    }

    #[tracing::instrument(
        name = "s3.get_object",
        skip(self),
        fields(s3.bucket = %bucket, s3.key = %key, bytes_written = tracing::field::Empty),
        err
    )]
    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
    ) -> Result<u64, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StorageError::request("GetObject", service_err)
                }
            })?;

        let mut file = File::create(dest)
            .await
            .map_err(|e| StorageError::io(dest, e))?;

        let mut written: u64 = 0;
        let mut body = response.body;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StorageError::BodyError(e.to_string()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::io(dest, e))?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| StorageError::io(dest, e))?;

        tracing::Span::current().record("bytes_written", written);
        Ok(written)
    }

    #[tracing::instrument(
        name = "s3.list_object_versions",
        skip(self),
        fields(
            s3.bucket = %bucket,
            versions = tracing::field::Empty,
            total_bytes = tracing::field::Empty
        ),
        err
    )]
    async fn total_stored_bytes(&self, bucket: &str) -> Result<u64, StorageError> {
        let mut total: u64 = 0;
        let mut versions: u64 = 0;
        let mut key_marker: Option<String> = None;
        let mut version_id_marker: Option<String> = None;

        loop {
            let mut request = self.client.list_object_versions().bucket(bucket);

            if let Some(ref marker) = key_marker {
                request = request.key_marker(marker);
            }
            if let Some(ref marker) = version_id_marker {
                request = request.version_id_marker(marker);
            }

            let page = request
                .send()
                .await
                .map_err(|e| StorageError::request("ListObjectVersions", e))?;

            for version in page.versions() {
                total += version.size().map_or(0, |s| u64::try_from(s).unwrap_or(0));
                versions += 1;
            }

            if page.is_truncated() != Some(true) {
                break;
            }

            key_marker = page.next_key_marker().map(str::to_string);
            version_id_marker = page.next_version_id_marker().map(str::to_string);
            if key_marker.is_none() {
                break;
            }
        }

        let span = tracing::Span::current();
        span.record("versions", versions);
        span.record("total_bytes", total);

        Ok(total)
    }
}

#[async_trait]
impl BucketAdmin for S3Client {
    #[tracing::instrument(name = "s3.head_bucket", skip(self), fields(s3.bucket = %bucket), err)]
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::request("HeadBucket", service_err))
                }
            }
        }
    }

    #[tracing::instrument(
        name = "s3.create_bucket",
        skip(self),
        fields(s3.bucket = %bucket, s3.region = %self.region),
        err
    )]
    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(bucket);

        // us-east-1 must not be sent as a location constraint
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::request("CreateBucket", e))?;

        Ok(())
    }

    #[tracing::instrument(name = "s3.put_bucket_versioning", skip(self), fields(s3.bucket = %bucket), err)]
    async fn enable_versioning(&self, bucket: &str) -> Result<(), StorageError> {
        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(
                VersioningConfiguration::builder()
                    .status(BucketVersioningStatus::Enabled)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| StorageError::request("PutBucketVersioning", e))?;

        Ok(())
    }
}
