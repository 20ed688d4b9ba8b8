//! Per-task working directories.

use std::path::{Path, PathBuf};

use tokio::fs;
use vmix_media::fs_utils::remove_dir_if_exists;
use vmix_models::TaskId;

/// `<root>/task_<id>/{videos,audio,tts,results}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkTask {
    task_id: TaskId,
    root: PathBuf,
}

impl WorkTask {
    pub fn new(work_root: impl AsRef<Path>, task_id: TaskId) -> Self {
        let root = work_root.as_ref().join(task_id.dir_name());
        Self { task_id, root }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.root.join("videos")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audio")
    }

    pub fn tts_dir(&self) -> PathBuf {
        self.root.join("tts")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    /// Create every subdirectory. Existing directories are kept.
    pub async fn create(&self) -> std::io::Result<()> {
        for dir in [self.videos_dir(), self.audio_dir(), self.tts_dir(), self.results_dir()] {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Remove the whole task tree. Returns `false` if it was already gone.
    pub async fn remove(&self) -> std::io::Result<bool> {
        remove_dir_if_exists(&self.root).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_and_remove_twice() {
        let tmp = TempDir::new().unwrap();
        let task = WorkTask::new(tmp.path(), TaskId::from_string("42"));

        task.create().await.unwrap();
        assert!(task.videos_dir().is_dir());
        assert!(task.results_dir().is_dir());
        assert_eq!(task.root(), tmp.path().join("task_42"));

        assert!(task.remove().await.unwrap());
        assert!(!task.remove().await.unwrap());
    }
}
