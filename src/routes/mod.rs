pub mod api;

use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, middleware, routing::get};

use crate::handlers::api::health_check;
use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Assemble the public and protected routes around shared state.
///
/// Transport layers (CORS, rate limiting, security headers) are added by the binary.
pub fn build_app(app_state: Arc<AppState>) -> Router {
    let body_limit = app_state.config.max_request_body_bytes();

    let protected_routes = api::create_api_router()
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth_middleware,
        ))
        .layer(DefaultBodyLimit::max(body_limit));

    let public_routes = Router::new().route("/", get(health_check));

    public_routes.merge(protected_routes).with_state(app_state)
}
