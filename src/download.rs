//! Single-object download into a local folder

use crate::s3::{ObjectStore, StorageError};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// Fetch `key` from `bucket` into `<dest_dir>/<basename(key)>`.
///
/// `dest_dir` is created when missing; an existing file is overwritten.
pub async fn download_object(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    dest_dir: &Path,
) -> Result<DownloadResult, StorageError> {
    let file_name = Path::new(key)
        .file_name()
        .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;

    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| StorageError::io(dest_dir, e))?;

    let path = dest_dir.join(file_name);
    let bytes_written = store.get_object_to_file(bucket, key, &path).await?;

    tracing::info!(
        key = %key,
        bytes = bytes_written,
        dest = %path.display(),
        "Downloaded"
    );

    Ok(DownloadResult {
        path,
        bytes_written,
    })
}
