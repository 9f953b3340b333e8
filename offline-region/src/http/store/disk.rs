//! Persistent response store on the local filesystem.
//!
//! Each URL maps to a pair of files named by the SHA-256 of the URL:
//!
//! ```text
//! <root>/
//! ├── 3f1a...e2.body   raw response body
//! └── 3f1a...e2.json   validators, directives, store time
//! ```
//!
//! Files are written to a uniquely named temporary file and renamed into
//! place, so readers never observe a partially written entry. The metadata
//! file is renamed last and marks the entry as complete.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::{BoxFuture, CachedResponse, HttpCacheError, HttpCacheStore};
use crate::http::cache_control::CacheControl;

/// Subdirectory under the platform cache directory.
const CACHE_SUBDIR: &str = "offline-region/http";

#[derive(Debug, Serialize, Deserialize)]
struct EntryMetadata {
    url: String,
    etag: Option<String>,
    last_modified: Option<String>,
    max_age_secs: Option<u64>,
    no_cache: bool,
    no_store: bool,
    must_revalidate: bool,
    stored_at_millis: u64,
}

impl EntryMetadata {
    fn from_response(url: &str, response: &CachedResponse) -> Self {
        let stored_at_millis = response
            .stored_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            url: url.to_string(),
            etag: response.etag.clone(),
            last_modified: response.last_modified.clone(),
            max_age_secs: response.control.max_age.map(|d| d.as_secs()),
            no_cache: response.control.no_cache,
            no_store: response.control.no_store,
            must_revalidate: response.control.must_revalidate,
            stored_at_millis,
        }
    }

    fn into_response(self, body: Bytes) -> CachedResponse {
        CachedResponse {
            body,
            etag: self.etag,
            last_modified: self.last_modified,
            control: CacheControl {
                max_age: self.max_age_secs.map(Duration::from_secs),
                no_cache: self.no_cache,
                no_store: self.no_store,
                must_revalidate: self.must_revalidate,
            },
            stored_at: UNIX_EPOCH + Duration::from_millis(self.stored_at_millis),
        }
    }
}

/// Filesystem-backed response store.
pub struct DiskHttpCache {
    root: PathBuf,
}

impl DiskHttpCache {
    /// Opens (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, HttpCacheError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened disk HTTP cache");

        Ok(Self { root })
    }

    /// Platform cache location, e.g. `~/.cache/offline-region/http` on Linux.
    pub fn default_directory() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join(CACHE_SUBDIR))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_stem(&self, key: &str) -> PathBuf {
        entry_stem(&self.root, key)
    }

    async fn read_entry(&self, key: &str) -> Result<Option<CachedResponse>, HttpCacheError> {
        let stem = self.entry_stem(key);

        let metadata = match tokio::fs::read(stem.with_extension("json")).await {
            Ok(raw) => serde_json::from_slice::<EntryMetadata>(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Guard against digest collisions
        if metadata.url != key {
            return Ok(None);
        }

        let body = match tokio::fs::read(stem.with_extension("body")).await {
            Ok(body) => Bytes::from(body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(metadata.into_response(body)))
    }
}

fn entry_stem(root: &Path, key: &str) -> PathBuf {
    let digest = Sha256::digest(key.as_bytes());
    root.join(format!("{:x}", digest))
}

/// Writes `data` next to `target` under a unique temporary name, then renames
/// it into place. The temporary file is removed if either step fails.
async fn write_atomic(target: &Path, data: &[u8]) -> Result<(), HttpCacheError> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let temp = parent.join(format!(".tmp.{}", Uuid::new_v4()));

    if let Err(e) = tokio::fs::write(&temp, data).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&temp, target).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Writes body then metadata; the metadata rename completes the entry.
async fn write_entry(root: PathBuf, key: String, response: CachedResponse) -> Result<(), HttpCacheError> {
    let stem = entry_stem(&root, &key);
    let metadata = serde_json::to_vec(&EntryMetadata::from_response(&key, &response))?;

    write_atomic(&stem.with_extension("body"), &response.body).await?;
    write_atomic(&stem.with_extension("json"), &metadata).await?;
    Ok(())
}

impl HttpCacheStore for DiskHttpCache {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<CachedResponse>, HttpCacheError>> {
        let key = key.to_string();
        Box::pin(async move { self.read_entry(&key).await })
    }

    /// The write runs on its own task and completes even if the returned
    /// future is dropped, so a cancelled caller never leaves a half-written
    /// entry behind.
    fn put(&self, key: &str, response: CachedResponse) -> BoxFuture<'_, Result<(), HttpCacheError>> {
        let write = tokio::spawn(write_entry(self.root.clone(), key.to_string(), response));
        Box::pin(async move { write.await? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::store::sample_response;
    use futures::FutureExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_roundtrip_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let original = sample_response(b"png bytes", 120);

        {
            let store = DiskHttpCache::open(temp.path()).await.unwrap();
            store.put("http://t/3/1/2?", original.clone()).await.unwrap();
        }

        let store = DiskHttpCache::open(temp.path()).await.unwrap();
        let hit = store.get("http://t/3/1/2?").await.unwrap().unwrap();

        assert_eq!(hit.body, original.body);
        assert_eq!(hit.etag, original.etag);
        assert_eq!(hit.control, original.control);
        // Stored with millisecond precision
        let drift = original
            .stored_at
            .duration_since(hit.stored_at)
            .unwrap_or_default();
        assert!(drift < Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_miss_returns_none() {
        let temp = TempDir::new().unwrap();
        let store = DiskHttpCache::open(temp.path()).await.unwrap();
        assert!(store.get("http://t/0/0/0?").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_body() {
        let temp = TempDir::new().unwrap();
        let store = DiskHttpCache::open(temp.path()).await.unwrap();

        store.put("k", sample_response(b"old", 60)).await.unwrap();
        store.put("k", sample_response(b"new", 60)).await.unwrap();

        let hit = store.get("k").await.unwrap().unwrap();
        assert_eq!(hit.body.as_ref(), b"new");
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let store = DiskHttpCache::open(temp.path()).await.unwrap();
        store.put("k", sample_response(b"data", 60)).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| !n.contains(".tmp")));
    }

    #[tokio::test]
    async fn test_dropped_put_still_completes() {
        let temp = TempDir::new().unwrap();
        let store = DiskHttpCache::open(temp.path()).await.unwrap();

        for i in 0..5 {
            let key = format!("http://t/5/{}/0?", i);
            let put = store.put(&key, sample_response(b"tile body", 60));
            // Polled once, then dropped mid-write
            assert!(put.now_or_never().map_or(true, |r| r.is_ok()));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert!(names.iter().all(|n| !n.contains(".tmp")), "{:?}", names);
        for body in names.iter().filter(|n| n.ends_with(".body")) {
            let json = body.replace(".body", ".json");
            assert!(names.contains(&json), "{} has no metadata", body);
        }
        for i in 0..5 {
            let key = format!("http://t/5/{}/0?", i);
            assert!(store.get(&key).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_two_stores_share_a_root() {
        let temp = TempDir::new().unwrap();
        let first = DiskHttpCache::open(temp.path()).await.unwrap();
        let second = DiskHttpCache::open(temp.path()).await.unwrap();

        let (a, b) = tokio::join!(
            first.put("http://t/1/0/0?", sample_response(b"first", 60)),
            second.put("http://t/1/1/0?", sample_response(b"second", 60)),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(
            second.get("http://t/1/0/0?").await.unwrap().unwrap().body.as_ref(),
            b"first"
        );
        assert_eq!(
            first.get("http://t/1/1/0?").await.unwrap().unwrap().body.as_ref(),
            b"second"
        );
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let temp = TempDir::new().unwrap();
        // A directory at the target path makes the rename fail
        let target = temp.path().join("entry.body");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("occupied"), b"x").unwrap();

        assert!(write_atomic(&target, b"data").await.is_err());

        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["entry.body".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = DiskHttpCache::open(temp.path()).await.unwrap();
        store.put("k", sample_response(b"data", 60)).await.unwrap();

        let stem = store.entry_stem("k");
        std::fs::write(stem.with_extension("json"), b"{not json").unwrap();

        assert!(matches!(
            store.get("k").await,
            Err(HttpCacheError::Metadata(_))
        ));
    }

    #[test]
    fn test_default_directory_suffix() {
        if let Some(dir) = DiskHttpCache::default_directory() {
            assert!(dir.ends_with("offline-region/http"));
        }
    }
}
