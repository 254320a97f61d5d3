//! Source folder enumeration

use super::{BatchError, Candidate};
use std::path::Path;

/// List the regular files directly inside `dir`.
///
/// Subdirectories are skipped and never descended into. Symlinks are followed
/// when deciding whether an entry is a regular file. Order is whatever the
/// platform's directory listing yields.
pub async fn enumerate_candidates(dir: &Path) -> Result<Vec<Candidate>, BatchError> {
    let read_error = |source| BatchError::DirectoryRead {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_error)?;
    let mut candidates = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
        let path = entry.path();

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if !metadata.is_file() {
            continue;
        }

        let key = entry.file_name().to_string_lossy().into_owned();
        candidates.push(Candidate::new(path, key, metadata.len()));
    }

    tracing::debug!(
        dir = %dir.display(),
        candidates = candidates.len(),
        "Enumerated source folder"
    );

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_lists_files_and_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), b"aaaa").unwrap();
        fs::write(dir.path().join("b.bin"), b"bb").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.bin"), b"c").unwrap();

        let mut candidates = enumerate_candidates(dir.path()).await.unwrap();
        candidates.sort_by(|a, b| a.key().cmp(b.key()));

        let keys: Vec<&str> = candidates.iter().map(|c| c.key()).collect();
        assert_eq!(keys, vec!["a.bin", "b.bin"]);
        assert_eq!(candidates[0].size(), 4);
        assert_eq!(candidates[1].size(), 2);
        assert_eq!(candidates[0].path(), dir.path().join("a.bin"));
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let candidates = enumerate_candidates(dir.path()).await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");

        let err = enumerate_candidates(&missing).await.unwrap_err();
        assert!(matches!(err, BatchError::DirectoryRead { .. }));
    }
}
