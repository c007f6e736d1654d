//! Key/value persistence for store records.
//!
//! Records are opaque JSON values keyed by store name. [`FileStorage`]
//! keeps every record in one JSON object on disk; [`MemoryStorage`]
//! keeps them in a map for tests and ephemeral sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

#[async_trait]
pub trait StateStorage: Send + Sync + 'static {
    /// Stored record for `name`, or `None` if nothing was saved yet.
    async fn load(&self, name: &str) -> Result<Option<Value>, StorageError>;

    /// Replace the record for `name`.
    async fn save(&self, name: &str, value: Value) -> Result<(), StorageError>;
}

/// Errors from a [`StateStorage`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored document is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// FileStorage
// ---------------------------------------------------------------------------

/// Single JSON document on disk, written atomically via temp file + rename.
pub struct FileStorage {
    path: PathBuf,
    /// Serialises read-modify-write cycles on the document.
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Map<String, Value>, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        match serde_json::from_slice::<Value>(&bytes)? {
            Value::Object(map) => Ok(map),
            other => {
                tracing::warn!(
                    path = %self.path.display(),
                    kind = json_kind(&other),
                    "State document is not an object, starting fresh"
                );
                Ok(Map::new())
            }
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStorage for FileStorage {
    async fn load(&self, name: &str) -> Result<Option<Value>, StorageError> {
        let mut document = self.read_document().await?;
        Ok(document.remove(name))
    }

    async fn save(&self, name: &str, value: Value) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.read_document().await?;
        document.insert(name.to_string(), value);
        let bytes = serde_json::to_vec_pretty(&Value::Object(document))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        tracing::trace!(path = %self.path.display(), store = name, "State saved");
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStorage {
    records: Mutex<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record, as if saved by an earlier session.
    pub async fn insert(&self, name: &str, value: Value) {
        self.records.lock().await.insert(name.to_string(), value);
    }
}

#[async_trait]
impl StateStorage for MemoryStorage {
    async fn load(&self, name: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.records.lock().await.get(name).cloned())
    }

    async fn save(&self, name: &str, value: Value) -> Result<(), StorageError> {
        self.records.lock().await.insert(name.to_string(), value);
        Ok(())
    }
}
