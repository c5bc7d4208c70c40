//! Chat request handling.
//!
//! One chat turn is: read history, assemble, complete, append. The append
//! happens only after a successful completion, so a failed turn leaves the
//! session exactly as it was.
//!
//! Turns on the same session id are serialized; turns on different sessions
//! run independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::assembler::assemble;
use crate::completion::CompletionGateway;
use crate::context::ContextBlob;
use crate::message::Message;
use crate::provider::ProviderError;
use crate::session::SessionStore;

/// Failure of a single chat request.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Session storage failed: {0:#}")]
    Storage(#[source] anyhow::Error),

    #[error("Completion failed: {0}")]
    Completion(#[from] ProviderError),
}

impl ChatError {
    /// Stable machine-readable code for error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage_error",
            Self::Completion(_) => "completion_failed",
        }
    }
}

/// Result of a successful chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub reply: String,
    pub session_id: String,
}

/// Per-session turn locks.
#[derive(Default)]
struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    fn get(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the entry unless another task still holds or awaits it.
    /// The caller's own handle counts as one reference besides the map's.
    fn release(&self, session_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(session_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Orchestrates chat turns against the store and the completion gateway.
pub struct ChatService {
    context: ContextBlob,
    store: Arc<dyn SessionStore>,
    gateway: CompletionGateway,
    locks: SessionLocks,
}

impl ChatService {
    pub fn new(context: ContextBlob, store: Arc<dyn SessionStore>, gateway: CompletionGateway) -> Self {
        Self {
            context,
            store,
            gateway,
            locks: SessionLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run one chat turn. A fresh session id is issued when none is given.
    pub async fn chat(
        &self,
        session_id: Option<String>,
        message: String,
    ) -> Result<ChatReply, ChatError> {
        let session_id = session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let lock = self.locks.get(&session_id);
        let result = {
            let _turn = lock.lock().await;
            self.run_turn(&session_id, message).await
        };
        self.locks.release(&session_id);

        result.map(|reply| ChatReply { reply, session_id })
    }

    /// Body of one turn; the caller holds the session lock.
    async fn run_turn(&self, session_id: &str, message: String) -> Result<String, ChatError> {
        let history = self
            .store
            .get_history(session_id)
            .await
            .map_err(ChatError::Storage)?;

        tracing::info!(
            session_id = %session_id,
            history_len = history.len(),
            model = %self.gateway.model(),
            "Chat turn started"
        );

        let messages = assemble(&self.context, &history, &message);

        let reply = match self.gateway.complete(messages).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Completion failed, history unchanged");
                return Err(e.into());
            }
        };

        self.store
            .append_turn(session_id, Message::user(message), Message::assistant(reply.clone()))
            .await
            .map_err(ChatError::Storage)?;

        tracing::info!(session_id = %session_id, reply_chars = reply.len(), "Chat turn completed");

        Ok(reply)
    }

    /// Delete a session. Unknown ids succeed too.
    ///
    /// Waits for an in-flight turn on the same session to finish first.
    pub async fn clear_session(&self, session_id: &str) -> Result<(), ChatError> {
        let lock = self.locks.get(session_id);
        let result = {
            let _turn = lock.lock().await;
            self.store.delete(session_id).await
        };
        self.locks.release(session_id);

        result.map_err(ChatError::Storage)?;
        tracing::info!(session_id = %session_id, "Session cleared");
        Ok(())
    }
}
