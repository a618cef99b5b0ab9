use async_trait::async_trait;
use shared::{StoreError, StoreResult};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Binary object storage for member photos.
#[async_trait]
pub trait PhotoStorage: Send + Sync {
    async fn upload(&self, path: &str, bytes: &[u8]) -> StoreResult<()>;
    async fn remove(&self, path: &str) -> StoreResult<()>;
    fn public_url(&self, path: &str) -> String;
}

/// Writes objects below `root`; they are served back at `<base_url>/photos/<path>`.
pub struct FsPhotoStorage {
    root: PathBuf,
    base_url: String,
}

impl FsPhotoStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || path.is_empty() {
            return Err(StoreError::Validation(format!("Ruta de archivo no válida: {path}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl PhotoStorage for FsPhotoStorage {
    async fn upload(&self, path: &str, bytes: &[u8]) -> StoreResult<()> {
        let target = self.resolve(path)?;
        if fs::try_exists(&target).await.unwrap_or(false) {
            return Err(StoreError::Conflict(format!("The resource already exists: {path}")));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Remote(e.to_string()))?;
        }
        fs::write(&target, bytes)
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))?;
        info!("Stored photo {} ({} bytes)", path, bytes.len());
        Ok(())
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Remote(e.to_string())),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/photos/{}", self.base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_writes_file_and_builds_public_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsPhotoStorage::new(dir.path(), "http://club.local/");

        storage
            .upload("avatars/a.png", b"png-bytes")
            .await
            .expect("upload");

        let written = std::fs::read(dir.path().join("avatars/a.png")).expect("read back");
        assert_eq!(written, b"png-bytes");
        assert_eq!(
            storage.public_url("avatars/a.png"),
            "http://club.local/photos/avatars/a.png"
        );
    }

    #[tokio::test]
    async fn upload_rejects_escaping_paths_and_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsPhotoStorage::new(dir.path(), "http://club.local");

        let err = storage.upload("../evil.png", b"x").await.expect_err("escape");
        assert!(matches!(err, StoreError::Validation(_)));

        storage.upload("avatars/b.png", b"x").await.expect("first");
        let err = storage.upload("avatars/b.png", b"y").await.expect_err("duplicate");
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn remove_deletes_object_and_tolerates_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsPhotoStorage::new(dir.path(), "http://club.local");

        storage.upload("avatars/c.png", b"x").await.expect("upload");
        storage.remove("avatars/c.png").await.expect("remove");
        assert!(!dir.path().join("avatars/c.png").exists());
        storage.remove("avatars/c.png").await.expect("already gone");
    }
}
