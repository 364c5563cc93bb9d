//! Local filesystem artifact store
//!
//! Artifacts are JSON documents. Writes go to a temporary sibling first and
//! are renamed into place, so an interrupted write never leaves something
//! that looks like a finished artifact.

use crate::storage::{ArtifactStore, Locator, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

/// Artifact store backed by the local filesystem
#[derive(Debug, Clone, Default)]
pub struct LocalArtifactStore;

impl LocalArtifactStore {
    pub fn new() -> Self {
        Self
    }

    fn path_for(locator: &Locator) -> Result<PathBuf, StorageError> {
        if let Some(scheme) = locator.scheme() {
            if scheme != "file" {
                return Err(StorageError::UnsupportedScheme {
                    scheme: scheme.to_string(),
                    locator: locator.to_string(),
                });
            }
            return Ok(PathBuf::from(locator.as_str().trim_start_matches("file://")));
        }
        Ok(PathBuf::from(locator.as_str()))
    }

    fn io_error(locator: &Locator, source: std::io::Error) -> StorageError {
        StorageError::Io {
            locator: locator.to_string(),
            source,
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn exists(&self, locator: &Locator) -> Result<bool, StorageError> {
        let path = Self::path_for(locator)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Self::io_error(locator, e))
    }

    async fn read(&self, locator: &Locator) -> Result<Value, StorageError> {
        let path = Self::path_for(locator)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(locator.to_string()));
            }
            Err(e) => return Err(Self::io_error(locator, e)),
        };

        serde_json::from_slice(&bytes).map_err(|source| StorageError::Decode {
            locator: locator.to_string(),
            source,
        })
    }

    async fn write(&self, locator: &Locator, value: &Value) -> Result<(), StorageError> {
        let path = Self::path_for(locator)?;
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Encode {
            locator: locator.to_string(),
            source,
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error(locator, e))?;
        }

        let mut staging = path.clone().into_os_string();
        staging.push(format!(".tmp-{}", Uuid::new_v4().simple()));
        let staging = PathBuf::from(staging);

        tokio::fs::write(&staging, &bytes)
            .await
            .map_err(|e| Self::io_error(locator, e))?;
        if let Err(e) = tokio::fs::rename(&staging, &path).await {
            tokio::fs::remove_file(&staging).await.ok();
            return Err(Self::io_error(locator, e));
        }

        debug!("Wrote {} bytes to {}", bytes.len(), locator);
        Ok(())
    }

    async fn modified(&self, locator: &Locator) -> Result<Option<DateTime<Utc>>, StorageError> {
        let path = Self::path_for(locator)?;
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => {
                let modified = metadata
                    .modified()
                    .map_err(|e| Self::io_error(locator, e))?;
                Ok(Some(DateTime::<Utc>::from(modified)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(locator, e)),
        }
    }

    fn describe(&self) -> String {
        "local filesystem".to_string()
    }
}
