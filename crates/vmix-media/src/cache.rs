//! Content-addressed local asset cache.
//!
//! Every fetched or synthesized asset lives at
//! `<folder>/<sha256(identity)><ext>`. File presence is the only cache
//! state: a path that exists is a hit. Writers go through
//! [`AssetCache::get_or_create`], which serializes work per path and
//! promotes a `.part` file to the final name only after the producer
//! succeeds.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use crate::error::MediaResult;
use crate::fs_utils::{discard_partial, partial_path};
use crate::mime::extension_for;

/// A resolved cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Final on-disk location
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// True when the file already existed
    pub hit: bool,
}

/// Per-path single-writer cache.
#[derive(Debug, Default)]
pub struct AssetCache {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hex SHA-256 of the source identity.
    pub fn cache_key(identity: &str) -> String {
        format!("{:x}", Sha256::digest(identity.as_bytes()))
    }

    /// Where the asset for `identity` lives inside `folder`.
    pub fn entry_path(folder: &Path, identity: &str, media_type: &str) -> MediaResult<PathBuf> {
        let ext = extension_for(media_type)?;
        Ok(folder.join(format!("{}{}", Self::cache_key(identity), ext)))
    }

    /// Return the entry at `path`, producing it with `create` on a miss.
    ///
    /// `create` receives the partial path to write and returns the number of
    /// bytes written. On failure the partial file is removed and the error is
    /// returned unchanged. Concurrent callers for the same path wait for the
    /// first one and then observe its result as a hit.
    pub async fn get_or_create<F, Fut, E>(&self, path: PathBuf, create: F) -> Result<CacheEntry, E>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<u64, E>>,
        E: From<std::io::Error>,
    {
        let lock = self.lock_for(&path);
        let result = {
            let _guard = lock.lock().await;
            populate(path.clone(), create).await
        };
        drop(lock);
        self.release(&path);
        result
    }

    /// Number of paths with an active writer or waiter.
    pub fn in_flight(&self) -> usize {
        self.locks.lock().map(|m| m.len()).unwrap_or(0)
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn release(&self, path: &Path) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = locks.get(path) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(path);
            }
        }
    }
}

async fn populate<F, Fut, E>(path: PathBuf, create: F) -> Result<CacheEntry, E>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<u64, E>>,
    E: From<std::io::Error>,
{
    if fs::try_exists(&path).await? {
        let size = fs::metadata(&path).await?.len();
        debug!(path = %path.display(), "Cache hit");
        return Ok(CacheEntry {
            path,
            size,
            hit: true,
        });
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let partial = partial_path(&path);
    let size = match create(partial.clone()).await {
        Ok(size) => size,
        Err(e) => {
            discard_partial(&partial).await;
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&partial, &path).await {
        discard_partial(&partial).await;
        return Err(e.into());
    }

    Ok(CacheEntry {
        path,
        size,
        hit: false,
    })
}
