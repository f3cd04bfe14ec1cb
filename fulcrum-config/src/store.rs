//! The backing-store port [`ConfigCenter`](crate::ConfigCenter) reads
//! through and writes through to, plus a filesystem implementation.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Persistence for the override document. Whatever lives behind this
/// port is the source of truth the cache reloads from on TTL expiry.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the current override document, or `null` if none has ever
    /// been written.
    async fn load(&self) -> Result<serde_json::Value, ConfigError>;

    /// Persist `doc` as the new override document.
    async fn save(&self, doc: &serde_json::Value) -> Result<(), ConfigError>;
}

/// Filesystem-backed [`ConfigStore`] using the atomic `.tmp` + rename
/// write pattern, with file permissions restricted to `0o600` (§6
/// "Config override document").
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Build a store rooted at a single JSON document path. The file
    /// and its parent directory are created lazily on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone();
        let file_name = tmp
            .file_name()
            .map(|n| format!("{}.tmp", n.to_string_lossy()))
            .unwrap_or_else(|| "config.json.tmp".to_string());
        tmp.set_file_name(file_name);
        tmp
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<serde_json::Value, ConfigError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|e| ConfigError::Malformed(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(serde_json::Value::Null),
            Err(e) => Err(ConfigError::LoadFailed(e.to_string())),
        }
    }

    async fn save(&self, doc: &serde_json::Value) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        }

        let tmp_path = self.tmp_path();
        let contents =
            serde_json::to_string_pretty(doc).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        tokio::fs::write(&tmp_path, contents)
            .await
            .map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        }

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        Ok(())
    }
}
