//!
//! src/store.rs
//!
//! Object storage addressed by (bucket, key). The jobs only need put, get,
//! list, copy and delete; there is no move, so archiving is copy then delete.
//!

use std::{
    collections::BTreeMap,
    fs,
    path::{Component, Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::errors::PipelineError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), PipelineError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, PipelineError>;

    /// Keys under `prefix`, sorted lexicographically
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, PipelineError>;

    async fn copy(&self, bucket: &str, src_key: &str, dst_key: &str) -> Result<(), PipelineError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), PipelineError>;
}

/// Buckets are directories under `root`, keys are paths relative to them
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, PipelineError> {
        let rel = Self::checked_relative(bucket)?;
        if rel.components().count() != 1 {
            return Err(PipelineError::Storage(format!("invalid bucket name {bucket:?}")));
        }
        Ok(self.root.join(rel))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, PipelineError> {
        Ok(self.bucket_dir(bucket)?.join(Self::checked_relative(key)?))
    }

    /// Rejects anything that could resolve outside the bucket directory
    fn checked_relative(key: &str) -> Result<PathBuf, PipelineError> {
        if key.is_empty() || key.contains('\\') {
            return Err(PipelineError::Storage(format!("invalid key {key:?}")));
        }
        let path = Path::new(key);
        let normal = path.components().all(|c| matches!(c, Component::Normal(_)));
        if !normal {
            return Err(PipelineError::Storage(format!("invalid key {key:?}")));
        }
        Ok(path.to_path_buf())
    }

    fn write_atomic(path: &Path, body: &[u8]) -> Result<(), PipelineError> {
        let parent = path.parent().ok_or_else(|| PipelineError::Storage(
            format!("no parent for {}", path.display())
        ))?;
        fs::create_dir_all(parent).map_err(|e|
            PipelineError::Storage(format!("create dir {}: {e}", parent.display()))
        )?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| PipelineError::Storage(
                format!("tempfile in {}: {e}", parent.display())
            ))?;
        std::io::Write::write_all(&mut temp, body)
            .map_err(|e| PipelineError::Storage(format!("write {}: {e}", path.display())))?;

        temp.persist(path).map_err(|e|
            PipelineError::Storage(format!("persist {}: {e}", path.display())))?;
        Ok(())
    }

    fn not_found(bucket: &str, key: &str) -> PipelineError {
        PipelineError::NotFound(format!("{bucket}/{key}"))
    }
}

#[async_trait]
impl ObjectStore for DiskStore {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), PipelineError> {
        let path = self.object_path(bucket, key)?;
        Self::write_atomic(&path, &body)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, PipelineError> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path) {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Self::not_found(bucket, key)),
            Err(e) => Err(PipelineError::Storage(format!("read {}: {e}", path.display()))),
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, PipelineError> {
        let dir = self.bucket_dir(bucket)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in walkdir::WalkDir::new(&dir).min_depth(1) {
            let entry = entry.map_err(|e| PipelineError::Storage(
                format!("walk {}: {e}", dir.display())
            ))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&dir) else { continue };
            // keys always use '/' regardless of platform
            let Some(parts) = rel.components()
                .map(|c| c.as_os_str().to_str())
                .collect::<Option<Vec<_>>>() else {
                tracing::warn!(path = %entry.path().display(), "store.list.non_utf8");
                continue;
            };
            let key = parts.join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn copy(&self, bucket: &str, src_key: &str, dst_key: &str) -> Result<(), PipelineError> {
        let body = self.get(bucket, src_key).await?;
        self.put(bucket, dst_key, body).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), PipelineError> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Self::not_found(bucket, key)),
            Err(e) => Err(PipelineError::Storage(format!("remove {}: {e}", path.display()))),
        }
    }
}

/// In-process store, handy for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<(String, String), Vec<u8>>>, PipelineError> {
        self.objects.lock()
            .map_err(|_| PipelineError::Storage("memory store poisoned".to_string()))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), PipelineError> {
        self.lock()?.insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, PipelineError> {
        self.lock()?
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("{bucket}/{key}")))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, PipelineError> {
        Ok(self.lock()?
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn copy(&self, bucket: &str, src_key: &str, dst_key: &str) -> Result<(), PipelineError> {
        let mut objects = self.lock()?;
        let body = objects.get(&(bucket.to_string(), src_key.to_string()))
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("{bucket}/{src_key}")))?;
        objects.insert((bucket.to_string(), dst_key.to_string()), body);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), PipelineError> {
        self.lock()?
            .remove(&(bucket.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or_else(|| PipelineError::NotFound(format!("{bucket}/{key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disk_store_round_trips_objects() -> Result<(), PipelineError> {
        let dir = tempfile::tempdir()?;
        let store = DiskStore::new(dir.path());

        store.put("raw", "processing/20240101_000000.json", b"{}".to_vec()).await?;
        assert_eq!(store.get("raw", "processing/20240101_000000.json").await?, b"{}");
        assert!(dir.path().join("raw/processing/20240101_000000.json").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn disk_store_lists_sorted_by_prefix() -> Result<(), PipelineError> {
        let dir = tempfile::tempdir()?;
        let store = DiskStore::new(dir.path());

        store.put("raw", "processing/20240102_000000.json", vec![1]).await?;
        store.put("raw", "processing/20240101_000000.json", vec![2]).await?;
        store.put("raw", "processed/20231231_000000.json", vec![3]).await?;

        assert_eq!(store.list("raw", "processing/").await?, vec![
            "processing/20240101_000000.json".to_string(),
            "processing/20240102_000000.json".to_string(),
        ]);
        assert!(store.list("missing", "").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn disk_store_copy_then_delete() -> Result<(), PipelineError> {
        let dir = tempfile::tempdir()?;
        let store = DiskStore::new(dir.path());

        store.put("raw", "processing/a.json", b"abc".to_vec()).await?;
        store.copy("raw", "processing/a.json", "processed/a.json").await?;
        store.delete("raw", "processing/a.json").await?;

        assert_eq!(store.get("raw", "processed/a.json").await?, b"abc");
        assert!(matches!(
            store.get("raw", "processing/a.json").await,
            Err(PipelineError::NotFound(_))
        ));
        assert!(matches!(
            store.delete("raw", "processing/a.json").await,
            Err(PipelineError::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn disk_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());

        for key in ["../evil.json", "/etc/passwd", "a/../../b", "a\\b", ""] {
            assert!(matches!(
                store.put("raw", key, vec![]).await,
                Err(PipelineError::Storage(_))
            ), "{key:?} should be rejected");
        }
        assert!(store.put("..", "x.json", vec![]).await.is_err());
        assert!(store.put("a/b", "x.json", vec![]).await.is_err());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn disk_store_skips_non_utf8_paths() -> Result<(), PipelineError> {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let dir = tempfile::tempdir()?;
        let store = DiskStore::new(dir.path());
        store.put("raw", "processing/20240101_000000.json", vec![1]).await?;

        let bad = dir.path()
            .join("raw/processing")
            .join(OsStr::from_bytes(b"bad\xff"));
        fs::create_dir_all(&bad)?;
        fs::write(bad.join("x.json"), b"{}")?;

        assert_eq!(store.list("raw", "processing/").await?, vec![
            "processing/20240101_000000.json".to_string(),
        ]);
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_scopes_by_bucket() -> Result<(), PipelineError> {
        let store = MemoryStore::new();
        store.put("raw", "processing/b.json", vec![1]).await?;
        store.put("raw", "processing/a.json", vec![2]).await?;
        store.put("out", "processing/c.json", vec![3]).await?;

        assert_eq!(store.list("raw", "processing/").await?, vec![
            "processing/a.json".to_string(),
            "processing/b.json".to_string(),
        ]);

        store.copy("raw", "processing/a.json", "processed/a.json").await?;
        store.delete("raw", "processing/a.json").await?;
        assert_eq!(store.get("raw", "processed/a.json").await?, vec![2]);
        assert!(store.get("raw", "processing/a.json").await.is_err());
        Ok(())
    }
}
