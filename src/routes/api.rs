use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::chat;
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router with protected routes
///
/// Note: Authentication middleware should be applied in main.rs after state is available
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Protected routes (auth required when AUTH_REQUIRED=true)
        .route("/ai/audio_chat", post(chat::audio_chat))
        .route("/ai/chat/sse", get(chat::chat_sse))
        .route("/ai/chat/sync", get(chat::chat_sync))
        .layer(TraceLayer::new_for_http())
}
