//! Relay Gateway - chat relay between a web client and a hosted LLM.
//!
//! Every request is answered by the completion API with a fixed identity and
//! context prompt in front of the session's prior turns:
//! ```text
//! Client → POST /chat → history (store) → assemble → complete → append → reply
//!                                            ↑
//!                                  context blob (built once)
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod assembler;
pub mod completion;
pub mod context;
pub mod handler;
pub mod message;
pub mod provider;
pub mod routes;
pub mod session;

pub use assembler::{assemble, priming_pair, PRIMING_ACK};
pub use completion::CompletionGateway;
pub use context::{build_context, ContextBlob};
pub use handler::{ChatError, ChatReply, ChatService};
pub use message::{Message, Role};
pub use provider::{ChatRequest, ChatResponse, OpenRouterProvider, Provider, ProviderError};
pub use routes::AppState;
pub use session::{create_session_store, InMemorySessionStore, SessionStore, SqliteSessionStore};

use axum::http::HeaderValue;
use axum::Router;
use relay_common::config::{Config, ServerConfig};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the CORS layer for the configured frontend origins.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) if origin != "*" => Some(value),
            _ => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    routes::build_routes(state)
        .layer(cors_layer(&server.allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// Compose the application from configuration.
///
/// Validates the configuration, builds the context blob once, and opens the
/// session store. Any error here must stop startup.
pub fn build_state(config: &Config) -> relay_common::Result<AppState> {
    config.validate()?;

    let context = build_context(&config.context);
    let store = create_session_store(&config.storage)?;
    let gateway = CompletionGateway::from_config(&config.llm);

    tracing::info!(
        store = store.name(),
        model = %config.llm.model,
        "Chat service composed"
    );

    Ok(AppState::new(ChatService::new(context, store, gateway)))
}

/// Start the gateway server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let state = build_state(config)?;
    let router = build_router(state, &config.server);

    let addr = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Starting Relay Gateway on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
