//! Route definitions for Relay Gateway.
//!
//! - `GET /`, `GET /health`: liveness
//! - `POST /chat`: run one chat turn
//! - `DELETE /chat/:session_id`: clear a session

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::handler::{ChatError, ChatService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
}

impl AppState {
    pub fn new(chat: ChatService) -> Self {
        Self {
            chat: Arc::new(chat),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// `POST /chat` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequestBody {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `POST /chat` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponseBody {
    pub reply: String,
    pub session_id: String,
}

/// `DELETE /chat/:session_id` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub status: String,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub code: String,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        tracing::error!(code = self.code(), error = %self, "Chat request failed");

        let body = ErrorResponse {
            detail: self.to_string(),
            code: self.code().to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// Build the API routes (no middleware).
pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/chat/:session_id", delete(clear_session_handler))
        .with_state(state)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "relay-gateway".to_string(),
    })
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(body): Json<ChatRequestBody>,
) -> Result<Json<ChatResponseBody>, ChatError> {
    let reply = state.chat.chat(body.session_id, body.message).await?;

    Ok(Json(ChatResponseBody {
        reply: reply.reply,
        session_id: reply.session_id,
    }))
}

async fn clear_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ClearResponse>, ChatError> {
    state.chat.clear_session(&session_id).await?;

    Ok(Json(ClearResponse {
        status: "cleared".to_string(),
    }))
}
