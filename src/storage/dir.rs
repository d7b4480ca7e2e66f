use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

use super::{validate_key, Collection};
use crate::Result;

const RECORD_EXTENSION: &str = "rec";
const TEMP_EXTENSION: &str = "tmp";

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Collection stored as one file per record inside a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write never leaves a truncated record behind.
#[derive(Debug, Clone)]
pub struct DirCollection {
    root: PathBuf,
}

impl DirCollection {
    /// Opens (and creates if needed) the collection directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        log::debug!("opened collection at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{RECORD_EXTENSION}"))
    }
}

#[async_trait]
impl Collection for DirCollection {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        match fs::read(self.record_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        validate_key(key)?;
        let path = self.record_path(key);
        // One temp file per write
        let seq = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let temp = self.root.join(format!("{key}.{seq}.{TEMP_EXTENSION}"));
        let written = match fs::write(&temp, value).await {
            Ok(()) => fs::rename(&temp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    log::warn!("cannot remove {}: {}", temp.display(), cleanup);
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        match fs::remove_file(self.record_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        Ok(keys)
    }

    async fn clear(&self) -> Result<()> {
        for key in self.keys().await? {
            self.delete(&key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dir_collection_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let collection = DirCollection::open(dir.path().join("tiles")).await.unwrap();

        collection.put("12-1-2", vec![7, 7, 7]).await.unwrap();
        collection.put("12-1-3", vec![8]).await.unwrap();
        drop(collection);

        let reopened = DirCollection::open(dir.path().join("tiles")).await.unwrap();
        assert_eq!(reopened.get("12-1-2").await.unwrap(), Some(vec![7, 7, 7]));

        let mut keys = reopened.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["12-1-2".to_string(), "12-1-3".to_string()]);

        reopened.delete("12-1-2").await.unwrap();
        reopened.delete("12-1-2").await.unwrap();
        assert_eq!(reopened.get("12-1-2").await.unwrap(), None);

        reopened.clear().await.unwrap();
        assert!(reopened.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_put_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let collection = DirCollection::open(dir.path()).await.unwrap();

        // A non-empty directory where the record belongs makes the rename fail
        let blocker = collection.record_path("12-1-2");
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), b"x").unwrap();

        assert!(collection.put("12-1-2", vec![1, 2, 3]).await.is_err());
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some(TEMP_EXTENSION))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_dir_collection_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let collection = DirCollection::open(dir.path()).await.unwrap();
        assert!(collection.put("../escape", vec![1]).await.is_err());
    }
}
