//! Remote object key layout.

use crate::error::{StorageError, StorageResult};

/// Content type of every rendered variant.
pub const VARIANT_CONTENT_TYPE: &str = "video/mp4";

/// `<task_name>/video_<index>.mp4`
pub fn variant_key(task_name: &str, index: usize) -> String {
    format!("{}/video_{}.mp4", task_name, index)
}

/// Reject keys that would escape the bucket prefix or are empty.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|seg| seg == "..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
