//! SQLite-backed session store.
//!
//! One row per session; the history is kept as a JSON array of
//! `{role, content}` objects so a session is read and written as a unit.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::SessionStore;
use crate::message::Message;

/// Durable session store on a single SQLite connection.
#[derive(Clone)]
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

/// Turn a connection string into something `Connection::open` accepts.
///
/// Accepts `sqlite://path`, `sqlite:path`, a bare path, or `:memory:`.
fn database_path(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

impl SqliteSessionStore {
    /// Open (or create) the session database named by `url`.
    pub fn open(url: &str) -> anyhow::Result<Self> {
        let path = database_path(url);

        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory {}", parent.display())
                    })?;
                }
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open session database '{}'", path))?;
        Self::init_schema(&conn)?;

        tracing::info!(path = %path, "Session database ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> anyhow::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id  TEXT PRIMARY KEY,
                history     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );",
        )
        .context("Failed to initialize session schema")?;
        Ok(())
    }

    /// Run blocking database work off the async executor.
    async fn with_conn<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("Lock error: {e}"))?;
            f(&mut conn)
        })
        .await?
    }
}

fn read_history(conn: &Connection, session_id: &str) -> anyhow::Result<Vec<Message>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT history FROM sessions WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(json) => serde_json::from_str(&json)
            .with_context(|| format!("Corrupt history for session '{}'", session_id)),
        None => Ok(Vec::new()),
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_history(&self, session_id: &str) -> anyhow::Result<Vec<Message>> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| read_history(conn, &session_id))
            .await
    }

    async fn append_turn(
        &self,
        session_id: &str,
        user: Message,
        assistant: Message,
    ) -> anyhow::Result<()> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let mut history = read_history(&tx, &session_id)?;
            history.push(user);
            history.push(assistant);

            let now = Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO sessions (session_id, history, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(session_id) DO UPDATE SET
                     history = excluded.history,
                     updated_at = excluded.updated_at",
                params![session_id, serde_json::to_string(&history)?, now],
            )
            .with_context(|| format!("Failed to save session '{}'", session_id))?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, session_id: &str) -> anyhow::Result<()> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM sessions WHERE session_id = ?1",
                params![session_id],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_connection_strings() {
        assert_eq!(database_path("sqlite:///var/lib/relay/s.db"), "/var/lib/relay/s.db");
        assert_eq!(database_path("sqlite://sessions.db"), "sessions.db");
        assert_eq!(database_path("sqlite:sessions.db"), "sessions.db");
        assert_eq!(database_path("data/sessions.db"), "data/sessions.db");
        assert_eq!(database_path(":memory:"), ":memory:");
    }

    #[tokio::test]
    async fn unseen_session_is_empty() {
        let store = SqliteSessionStore::open(":memory:").unwrap();
        assert!(store.get_history("never-seen").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn appends_in_order_and_deletes() {
        let store = SqliteSessionStore::open(":memory:").unwrap();
        store
            .append_turn("s1", Message::user("Hi"), Message::assistant("Hello"))
            .await
            .unwrap();
        store
            .append_turn("s1", Message::user("Stack?"), Message::assistant("Rust."))
            .await
            .unwrap();
        store
            .append_turn("s2", Message::user("Other"), Message::assistant("Session"))
            .await
            .unwrap();

        assert_eq!(
            store.get_history("s1").await.unwrap(),
            vec![
                Message::user("Hi"),
                Message::assistant("Hello"),
                Message::user("Stack?"),
                Message::assistant("Rust."),
            ]
        );

        store.delete("s1").await.unwrap();
        store.delete("never-seen").await.unwrap();
        assert!(store.get_history("s1").await.unwrap().is_empty());
        assert_eq!(store.get_history("s2").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("nested/sessions.db").display());

        {
            let store = SqliteSessionStore::open(&url).unwrap();
            store
                .append_turn("s1", Message::user("Hi"), Message::assistant("Hello"))
                .await
                .unwrap();
        }

        let reopened = SqliteSessionStore::open(&url).unwrap();
        assert_eq!(
            reopened.get_history("s1").await.unwrap(),
            vec![Message::user("Hi"), Message::assistant("Hello")]
        );
    }

    #[tokio::test]
    async fn stored_layout_is_one_json_row_per_session() {
        let store = SqliteSessionStore::open(":memory:").unwrap();
        store
            .append_turn("s1", Message::user("Hi"), Message::assistant("Hello"))
            .await
            .unwrap();

        let conn = store.conn.lock().unwrap();
        let (count, raw): (i64, String) = conn
            .query_row(
                "SELECT COUNT(*), MAX(history) FROM sessions WHERE session_id = 's1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello"}
            ])
        );
    }

    #[tokio::test]
    async fn corrupt_row_is_reported() {
        let store = SqliteSessionStore::open(":memory:").unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO sessions (session_id, history, created_at, updated_at)
                 VALUES ('bad', 'not json', '', '')",
                [],
            )
            .unwrap();

        let err = store.get_history("bad").await.unwrap_err();
        assert!(err.to_string().contains("Corrupt history"));
    }
}
