//! Artifact storage - where task results live between runs
//!
//! The engine never interprets artifacts. It asks a store whether something
//! exists at a locator, reads it back as a cached result, or writes a freshly
//! computed value there.

pub mod local;

pub use local::LocalArtifactStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::RwLock;

/// Error types for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {locator}: {source}")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact at {locator} is not valid JSON: {source}")]
    Decode {
        locator: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot encode artifact for {locator}: {source}")]
    Encode {
        locator: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no artifact at {0}")]
    NotFound(String),

    #[error("unsupported storage scheme '{scheme}' in {locator}")]
    UnsupportedScheme { scheme: String, locator: String },
}

/// Fully qualified address of an artifact: a storage root joined with a
/// pipeline-relative path.
///
/// Roots may be local directories or object-storage URLs such as
/// `gs://bucket/prefix`. A path that already carries a scheme is used as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Locator(String);

impl Locator {
    /// Join `path` onto `root`.
    ///
    /// A leading `/` on `path` means "relative to the root", matching how
    /// pipelines spell their output paths (`/dataset/table.ht`).
    pub fn join(root: &str, path: &str) -> Self {
        if path.contains("://") || root.is_empty() {
            return Locator(path.to_string());
        }

        let root = root.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Locator(format!("{}/{}", root, path))
    }

    /// Wrap an already absolute locator
    pub fn new(locator: impl Into<String>) -> Self {
        Locator(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// URL scheme (`gs`, `s3`, ...) if this locator points at remote storage
    pub fn scheme(&self) -> Option<&str> {
        self.0.split_once("://").map(|(scheme, _)| scheme)
    }

    pub fn is_remote(&self) -> bool {
        self.scheme().is_some()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait for artifact storage backends
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Check whether an artifact has been written at `locator`
    async fn exists(&self, locator: &Locator) -> Result<bool, StorageError>;

    /// Load the artifact at `locator`
    async fn read(&self, locator: &Locator) -> Result<Value, StorageError>;

    /// Persist `value` at `locator`, replacing anything already there
    async fn write(&self, locator: &Locator, value: &Value) -> Result<(), StorageError>;

    /// Last modification time, or `None` if nothing exists at `locator`
    async fn modified(&self, locator: &Locator) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// Short human-readable description for logs and CLI output
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
struct StoredArtifact {
    value: Value,
    modified: DateTime<Utc>,
}

/// In-memory artifact store (for testing or ephemeral runs)
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<Locator, StoredArtifact>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    /// Seed an artifact with an explicit modification time
    pub async fn insert_at(&self, locator: Locator, value: Value, modified: DateTime<Utc>) {
        self.artifacts
            .write()
            .await
            .insert(locator, StoredArtifact { value, modified });
    }

    /// Seed an artifact stamped with the current time
    pub async fn insert(&self, locator: Locator, value: Value) {
        self.insert_at(locator, value, Utc::now()).await;
    }

    pub async fn contains(&self, locator: &Locator) -> bool {
        self.artifacts.read().await.contains_key(locator)
    }

    pub async fn get(&self, locator: &Locator) -> Option<Value> {
        self.artifacts
            .read()
            .await
            .get(locator)
            .map(|artifact| artifact.value.clone())
    }

    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.artifacts.read().await.is_empty()
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn exists(&self, locator: &Locator) -> Result<bool, StorageError> {
        Ok(self.contains(locator).await)
    }

    async fn read(&self, locator: &Locator) -> Result<Value, StorageError> {
        self.get(locator)
            .await
            .ok_or_else(|| StorageError::NotFound(locator.to_string()))
    }

    async fn write(&self, locator: &Locator, value: &Value) -> Result<(), StorageError> {
        self.insert(locator.clone(), value.clone()).await;
        Ok(())
    }

    async fn modified(&self, locator: &Locator) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(self
            .artifacts
            .read()
            .await
            .get(locator)
            .map(|artifact| artifact.modified))
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
