//! Filesystem helpers for working directories and partial files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Sibling path used while a file is still being written.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Remove a file, treating a missing file as success.
pub async fn remove_file_if_exists(path: impl AsRef<Path>) -> std::io::Result<()> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove a partially written file, logging instead of failing.
pub async fn discard_partial(path: &Path) {
    if let Err(e) = remove_file_if_exists(path).await {
        tracing::warn!(path = %path.display(), "Failed to remove partial file: {}", e);
    }
}

/// Recursively remove a directory. Returns `false` when it was already gone.
///
/// Safe to call repeatedly on the same path.
pub async fn remove_dir_if_exists(path: impl AsRef<Path>) -> std::io::Result<bool> {
    match fs::remove_dir_all(path.as_ref()).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_path() {
        let p = partial_path(Path::new("/tmp/task_1/videos/abc.mp4"));
        assert_eq!(p, PathBuf::from("/tmp/task_1/videos/abc.mp4.part"));
    }

    #[tokio::test]
    async fn test_remove_dir_twice() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("task_x");
        fs::create_dir_all(target.join("videos")).await.unwrap();
        fs::write(target.join("videos").join("a.mp4"), b"data")
            .await
            .unwrap();

        assert!(remove_dir_if_exists(&target).await.unwrap());
        assert!(!target.exists());
        assert!(!remove_dir_if_exists(&target).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_missing_file_is_ok() {
        let dir = TempDir::new().unwrap();
        remove_file_if_exists(dir.path().join("nope.mp3"))
            .await
            .unwrap();
    }
}
