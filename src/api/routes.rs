use axum::{routing::get, Router};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::websocket::{websocket_handler, WsState};

use super::handlers::*;
use super::openapi::ApiDoc;

/// Create the API router with Swagger UI and WebSocket support
pub fn create_router(api_state: ApiState, ws_state: Arc<WsState>) -> Router {
    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Streaming endpoint - one session (and one broker connection) per client
        .route("/ws/stocks", get(websocket_handler))
        .with_state(ws_state)
        // Health endpoint
        .route("/api/v1/health", get(health_check))
        // Quote lookup endpoints
        .route("/api/v1/quotes", get(get_quotes))
        .route("/api/v1/quotes/:symbol", get(get_quote_by_symbol))
        // Fyers authorization-code flow
        .route("/api/v1/auth/login", get(get_auth_login))
        .route("/api/v1/auth/callback", get(auth_callback))
        .with_state(api_state)
}
