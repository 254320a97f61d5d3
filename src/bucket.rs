//! Bucket naming and provisioning

use crate::config::BucketConfig;
use crate::s3::{BucketAdmin, StorageError};
use chrono::{Local, NaiveDate};

/// Whether [`ensure_bucket`] found or made the bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    Existed,
    Created,
}

/// `<team>-<YYYYMMDD>`
pub fn dated_bucket_name(team: &str, date: NaiveDate) -> String {
    format!("{}-{}", team, date.format("%Y%m%d"))
}

/// Explicit name if configured, otherwise today's dated name
pub fn resolve_bucket_name(config: &BucketConfig) -> String {
    match &config.name {
        Some(name) => name.clone(),
        None => dated_bucket_name(&config.team, Local::now().date_naive()),
    }
}

/// Create `bucket` with versioning enabled unless it already exists.
///
/// An existing bucket is left untouched.
pub async fn ensure_bucket(
    admin: &dyn BucketAdmin,
    bucket: &str,
) -> Result<BucketStatus, StorageError> {
    if admin.bucket_exists(bucket).await? {
        tracing::warn!(bucket = %bucket, "Bucket already exists");
        return Ok(BucketStatus::Existed);
    }

    admin.create_bucket(bucket).await?;
    tracing::info!(bucket = %bucket, "Bucket created");

    admin.enable_versioning(bucket).await?;
    tracing::info!(bucket = %bucket, "Versioning enabled");

    Ok(BucketStatus::Created)
}
