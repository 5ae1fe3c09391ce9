//! Local folder connector
//!
//! Serves one side of a task from a root directory. Keys are relative
//! paths below the root with `/` separators on every platform; the
//! fingerprint is a streamed SHA-256 of the file content. Writes go
//! through a temp file in the target directory and a rename, so a crash
//! mid-write never leaves a half-copied file under the sync root.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument, warn};

use omnisync_core::domain::newtypes::{Fingerprint, ItemKey};
use omnisync_core::domain::task::FilterSet;
use omnisync_core::domain::ItemMeta;
use omnisync_core::ports::connector::{ConnectorError, ConnectorResult, IConnector};

use crate::digest_fingerprint;

const HASH_BUF_SIZE: usize = 64 * 1024;

/// Connector over a directory tree on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFolderConnector {
    root: PathBuf,
}

impl LocalFolderConnector {
    /// Creates a connector rooted at `root`. The root must exist by the
    /// time the first listing runs; it is not created implicitly.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory this connector serves.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a key to its path under the root. Keys are plain relative
    /// paths; empty, `.` and `..` segments are refused so a key can never
    /// escape the root.
    fn path_for(&self, key: &ItemKey) -> ConnectorResult<PathBuf> {
        let mut path = self.root.clone();
        for segment in key.as_str().split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(ConnectorError::PermissionDenied(key.clone()));
            }
            path.push(segment);
        }
        Ok(path)
    }

    fn key_for(&self, path: &Path) -> Option<ItemKey> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            segments.push(component.as_os_str().to_str()?);
        }
        ItemKey::new(segments.join("/")).ok()
    }
}

fn map_key_io(key: &ItemKey, e: std::io::Error) -> ConnectorError {
    match e.kind() {
        ErrorKind::NotFound => ConnectorError::ItemNotFound(key.clone()),
        ErrorKind::PermissionDenied => ConnectorError::PermissionDenied(key.clone()),
        _ => ConnectorError::Io(e),
    }
}

async fn fingerprint_file(path: &Path) -> ConnectorResult<Fingerprint> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    digest_fingerprint(hasher)
}

fn modified_at(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

#[async_trait]
impl IConnector for LocalFolderConnector {
    #[instrument(skip(self, filter), fields(root = %self.root.display()))]
    async fn list_items(&self, filter: &FilterSet) -> ConnectorResult<Vec<ItemMeta>> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(ConnectorError::Unavailable(format!(
                    "root '{}' is not a directory",
                    self.root.display()
                )))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConnectorError::Unavailable(format!(
                    "root '{}' does not exist",
                    self.root.display()
                )))
            }
            Err(e) => return Err(ConnectorError::Io(e)),
        }

        let mut items = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !metadata.is_file() {
                    continue;
                }
                let Some(key) = self.key_for(&path) else {
                    warn!(path = %path.display(), "Skipping file with non-UTF8 name");
                    continue;
                };
                if !filter.matches(key.as_str()) {
                    continue;
                }
                let fingerprint = fingerprint_file(&path).await?;
                let mut meta = ItemMeta::new(key.clone(), key.as_str(), fingerprint);
                if let Some(at) = modified_at(&metadata) {
                    meta = meta.with_modified_at(at);
                }
                items.push(meta);
            }
        }
        items.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(items = items.len(), "Listed local folder");
        Ok(items)
    }

    async fn read(&self, key: &ItemKey) -> ConnectorResult<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|e| map_key_io(key, e))
    }

    #[instrument(skip(self, payload), fields(key = %key, bytes = payload.len()))]
    async fn write(&self, key: &ItemKey, payload: &[u8]) -> ConnectorResult<Fingerprint> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_key_io(key, e))?;
        }

        // Temp file in the target directory keeps the rename on one
        // filesystem.
        let tmp_path = {
            let mut p = path.as_os_str().to_owned();
            p.push(".osync-tmp");
            PathBuf::from(p)
        };
        tokio::fs::write(&tmp_path, payload)
            .await
            .map_err(|e| map_key_io(key, e))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| map_key_io(key, e))?;

        let mut hasher = Sha256::new();
        hasher.update(payload);
        digest_fingerprint(hasher)
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &ItemKey) -> ConnectorResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| map_key_io(key, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ItemKey {
        ItemKey::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let connector = LocalFolderConnector::new(dir.path());

        let fp = connector.write(&key("a.txt"), b"payload").await.unwrap();
        assert!(!fp.as_str().is_empty());
        assert_eq!(connector.read(&key("a.txt")).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let connector = LocalFolderConnector::new(dir.path());

        connector
            .write(&key("nested/deep/a.txt"), b"x")
            .await
            .unwrap();
        assert!(dir.path().join("nested/deep/a.txt").is_file());
    }

    #[tokio::test]
    async fn test_listing_uses_slash_keys_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let connector = LocalFolderConnector::new(dir.path());
        connector.write(&key("sub/b.txt"), b"b").await.unwrap();
        connector.write(&key("a.txt"), b"a").await.unwrap();

        let items = connector.list_items(&FilterSet::match_all()).await.unwrap();
        let keys: Vec<&str> = items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "sub/b.txt"]);
        assert!(items.iter().all(|i| i.modified_at.is_some()));
    }

    #[tokio::test]
    async fn test_listing_respects_filter() {
        let dir = tempfile::tempdir().unwrap();
        let connector = LocalFolderConnector::new(dir.path());
        connector.write(&key("keep.md"), b"m").await.unwrap();
        connector.write(&key("skip.tmp"), b"t").await.unwrap();

        let filter = FilterSet::new(vec![], vec!["*.tmp".into()]).unwrap();
        let items = connector.list_items(&filter).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key.as_str(), "keep.md");
    }

    #[tokio::test]
    async fn test_listing_missing_root_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let connector = LocalFolderConnector::new(dir.path().join("nowhere"));

        let err = connector
            .list_items(&FilterSet::match_all())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_read_missing_is_item_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let connector = LocalFolderConnector::new(dir.path());

        let err = connector.read(&key("ghost.txt")).await.unwrap_err();
        assert!(matches!(err, ConnectorError::ItemNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_is_item_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let connector = LocalFolderConnector::new(dir.path());

        let err = connector.delete(&key("ghost.txt")).await.unwrap_err();
        assert!(matches!(err, ConnectorError::ItemNotFound(_)));
    }

    #[tokio::test]
    async fn test_traversal_keys_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let connector = LocalFolderConnector::new(dir.path());

        let err = connector.read(&key("../outside.txt")).await.unwrap_err();
        assert!(matches!(err, ConnectorError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_same_content_same_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let connector = LocalFolderConnector::new(dir.path());

        connector.write(&key("a.txt"), b"same").await.unwrap();
        connector.write(&key("b.txt"), b"same").await.unwrap();

        let items = connector.list_items(&FilterSet::match_all()).await.unwrap();
        assert_eq!(items[0].fingerprint, items[1].fingerprint);
    }
}
