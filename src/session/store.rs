use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::SessionError;

pub const SESSION_FILE: &str = "session.json";

/// Durable home of the conversation identifier
pub trait IdStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, SessionError>;

    fn save(&self, id: &str) -> Result<(), SessionError>;
}

impl<T: IdStore + ?Sized> IdStore for Arc<T> {
    fn load(&self) -> Result<Option<String>, SessionError> {
        (**self).load()
    }

    fn save(&self, id: &str) -> Result<(), SessionError> {
        (**self).save(id)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoredSession {
    conversation_id: Option<String>,
}

/// Stores the id as JSON in `<dir>/session.json`
pub struct FileIdStore {
    path: PathBuf,
}

impl FileIdStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdStore for FileIdStore {
    fn load(&self) -> Result<Option<String>, SessionError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path)
            .map_err(|e| SessionError::Storage(format!("Failed to read session: {}", e)))?;
        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(stored) => Ok(stored
                .conversation_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())),
            Err(e) => {
                tracing::warn!("Session file unreadable, a new id will be issued: {}", e);
                Ok(None)
            }
        }
    }

    fn save(&self, id: &str) -> Result<(), SessionError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| SessionError::Storage(format!("Failed to create data dir: {}", e)))?;
        }
        let json = serde_json::to_string_pretty(&StoredSession {
            conversation_id: Some(id.to_string()),
        })
        .map_err(|e| SessionError::Storage(format!("Failed to serialize session: {}", e)))?;
        fs::write(&self.path, json)
            .map_err(|e| SessionError::Storage(format!("Failed to save session: {}", e)))
    }
}

/// Process-lifetime store, for tests and ephemeral hosts
#[derive(Default)]
pub struct MemoryIdStore {
    id: Mutex<Option<String>>,
}

impl MemoryIdStore {
    pub fn with_id(id: &str) -> Self {
        Self {
            id: Mutex::new(Some(id.to_string())),
        }
    }
}

impl IdStore for MemoryIdStore {
    fn load(&self) -> Result<Option<String>, SessionError> {
        let guard = self
            .id
            .lock()
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        Ok(guard.clone().filter(|id| !id.trim().is_empty()))
    }

    fn save(&self, id: &str) -> Result<(), SessionError> {
        let mut guard = self
            .id
            .lock()
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        *guard = Some(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdStore::new(dir.path().join("nested"));

        assert_eq!(store.load().unwrap(), None);
        store.save("abc-123").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("abc-123"));
        assert!(store.path().ends_with(SESSION_FILE));
    }

    #[test]
    fn test_corrupt_or_blank_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdStore::new(dir.path());

        fs::write(store.path(), "{oops").unwrap();
        assert_eq!(store.load().unwrap(), None);

        fs::write(store.path(), r#"{"conversation_id": "   "}"#).unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
