//! Session storage.
//!
//! A session is an ordered list of real user/assistant turns keyed by an
//! opaque client-held id. Sessions come into existence on their first
//! append and are only removed by an explicit delete.

mod memory;
mod sqlite;

pub use memory::InMemorySessionStore;
pub use sqlite::SqliteSessionStore;

use std::sync::Arc;

use async_trait::async_trait;
use relay_common::config::{StorageBackend, StorageConfig};
use relay_common::Error;

use crate::message::Message;

/// Backend for per-session conversation history.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name (e.g., "memory", "sqlite")
    fn name(&self) -> &str;

    /// Get a session's history, oldest first.
    ///
    /// Unknown sessions have an empty history.
    async fn get_history(&self, session_id: &str) -> anyhow::Result<Vec<Message>>;

    /// Append one exchange, user message first, creating the session if needed.
    ///
    /// Both messages land together or not at all.
    async fn append_turn(
        &self,
        session_id: &str,
        user: Message,
        assistant: Message,
    ) -> anyhow::Result<()>;

    /// Remove a session entirely. Unknown sessions are not an error.
    async fn delete(&self, session_id: &str) -> anyhow::Result<()>;
}

/// Create the session store selected by configuration.
pub fn create_session_store(config: &StorageConfig) -> relay_common::Result<Arc<dyn SessionStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemorySessionStore::new())),
        StorageBackend::Sqlite => {
            let url = config.url.as_deref().ok_or_else(|| {
                Error::Config("storage.url is required for the sqlite backend".into())
            })?;
            let store = SqliteSessionStore::open(url)
                .map_err(|e| Error::Storage(format!("{e:#}")).with_context("Failed to open session database"))?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_memory_store_by_default() {
        let store = create_session_store(&StorageConfig::default()).unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[test]
    fn creates_sqlite_store() {
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            url: Some(":memory:".into()),
        };
        let store = create_session_store(&config).unwrap();
        assert_eq!(store.name(), "sqlite");
    }

    #[test]
    fn sqlite_without_url_is_config_error() {
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            url: None,
        };
        let err = create_session_store(&config).err().unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn unopenable_database_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            url: Some(dir.path().display().to_string()),
        };
        let err = create_session_store(&config).err().unwrap();
        assert!(!err.is_config());
        assert!(err.to_string().starts_with("Failed to open session database"));
    }
}
