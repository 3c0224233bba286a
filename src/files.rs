use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::{AppError, AppResult};

/// Attachment storage on local disk.
///
/// Every attachment is stored under a freshly generated uuid plus the
/// original file extension, never under the sender-supplied name.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn init(&self) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::Storage(format!("mkdir {}: {e}", self.root.display())))?;
        Ok(())
    }

    fn storage_key(file_name: &str) -> String {
        let ext = Path::new(file_name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        format!("{}{ext}", Uuid::new_v4())
    }

    // Keys are generated here, so anything with a separator in it never
    // came from this store.
    fn resolve(&self, key: &str) -> AppResult<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(AppError::NotFound(key.to_owned()));
        }
        Ok(self.root.join(key))
    }

    /// Write an attachment, returning its storage key and byte size.
    pub async fn save(&self, file_name: &str, data: &[u8]) -> AppResult<(String, i64)> {
        let key = Self::storage_key(file_name);
        let path = self.root.join(&key);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::Storage(format!("write {}: {e}", path.display())))?;
        Ok((key, data.len() as i64))
    }

    pub async fn exists(&self, key: &str) -> bool {
        match self.resolve(key) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn read(&self, key: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(key.to_owned()))
            }
            Err(e) => Err(AppError::Storage(format!("read {}: {e}", path.display()))),
        }
    }

    /// Delete an attachment. Already-gone files are not an error.
    pub async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("delete {}: {e}", path.display()))),
        }
    }

    /// Remove every stored attachment. Individual failures are logged and the
    /// rest of the wipe continues.
    pub async fn delete_all(&self) -> u64 {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(error = %err, dir = %self.root.display(), "failed to list upload dir");
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
                    if !is_file {
                        continue;
                    }
                    match tokio::fs::remove_file(entry.path()).await {
                        Ok(()) => removed += 1,
                        Err(err) => {
                            tracing::warn!(error = %err, path = %entry.path().display(), "failed to delete attachment");
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to walk upload dir");
                    break;
                }
            }
        }
        removed
    }
}
