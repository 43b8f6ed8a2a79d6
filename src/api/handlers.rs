use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, warn};

use crate::auth::TokenManager;
use crate::fyers::quotes::{qualify_symbol, FyersQuotesClient, QuotesError, SymbolQuote};

use super::responses::*;

/// Shared state for the REST handlers
#[derive(Clone)]
pub struct ApiState {
    pub token_manager: Arc<TokenManager>,
    pub quotes: Arc<FyersQuotesClient>,
}

/// Query parameters for quote lookup
#[derive(Debug, Deserialize)]
pub struct QuotesQuery {
    /// Comma-separated list of symbols; bare tickers default to NSE equity
    pub symbols: Option<String>,
}

/// Query parameters for the auth callback
#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub auth_code: Option<String>,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

/// Get quotes for a comma-separated list of symbols
#[utoipa::path(
    get,
    path = "/api/v1/quotes",
    tag = "Quotes",
    params(
        ("symbols" = Option<String>, Query, description = "Comma-separated symbols, e.g. NSE:SBIN-EQ,TCS")
    ),
    responses(
        (status = 200, description = "Per-symbol quote data", body = Vec<SymbolQuote>),
        (status = 400, description = "No symbols provided", body = ErrorResponse),
        (status = 401, description = "Re-authorization required", body = ErrorResponse),
        (status = 502, description = "Broker rejected the request", body = ErrorResponse)
    )
)]
pub async fn get_quotes(
    State(state): State<ApiState>,
    Query(query): Query<QuotesQuery>,
) -> impl IntoResponse {
    let symbols: Vec<String> = query
        .symbols
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(qualify_symbol)
        .collect();

    fetch_quotes(&state, symbols).await
}

/// Get a quote for one symbol
#[utoipa::path(
    get,
    path = "/api/v1/quotes/{symbol}",
    tag = "Quotes",
    params(
        ("symbol" = String, Path, description = "Symbol, e.g. NSE:SBIN-EQ or bare ticker")
    ),
    responses(
        (status = 200, description = "Quote data", body = Vec<SymbolQuote>),
        (status = 401, description = "Re-authorization required", body = ErrorResponse),
        (status = 502, description = "Broker rejected the request", body = ErrorResponse)
    )
)]
pub async fn get_quote_by_symbol(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    fetch_quotes(&state, vec![qualify_symbol(&symbol)]).await
}

async fn fetch_quotes(
    state: &ApiState,
    symbols: Vec<String>,
) -> Result<Json<Vec<SymbolQuote>>, (StatusCode, Json<ErrorResponse>)> {
    if symbols.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("No symbols provided")),
        ));
    }

    let Some(access_token) = state.token_manager.get_access_token().await else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::auth_required(
                "API token is invalid or expired. Please reauthorize.",
            )),
        ));
    };

    match state.quotes.quotes(&access_token, &symbols).await {
        Ok(quotes) => Ok(Json(quotes)),
        Err(QuotesError::Unauthorized) => Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::auth_required(
                "API token is invalid. Please reauthorize.",
            )),
        )),
        Err(QuotesError::Rejected { message, .. }) => Err((
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse::new(message)),
        )),
        Err(e) => {
            error!("Quote lookup failed: {}", e);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse::new(e.to_string())),
            ))
        }
    }
}

/// Get the Fyers authorization URL for administrators
#[utoipa::path(
    get,
    path = "/api/v1/auth/login",
    tag = "Auth",
    responses(
        (status = 200, description = "Authorization URL", body = AuthUrlResponse)
    )
)]
pub async fn get_auth_login(State(state): State<ApiState>) -> impl IntoResponse {
    Json(AuthUrlResponse {
        auth_url: state.token_manager.authorization_url(),
    })
}

/// Process the auth code from the Fyers callback
#[utoipa::path(
    get,
    path = "/api/v1/auth/callback",
    tag = "Auth",
    params(
        ("auth_code" = Option<String>, Query, description = "One-time authorization code")
    ),
    responses(
        (status = 200, description = "Authentication successful", body = AuthCallbackResponse),
        (status = 400, description = "No auth code provided", body = AuthCallbackResponse),
        (status = 401, description = "Authentication failed", body = AuthCallbackResponse)
    )
)]
pub async fn auth_callback(
    State(state): State<ApiState>,
    Query(query): Query<AuthCallbackQuery>,
) -> impl IntoResponse {
    let Some(auth_code) = query.auth_code.filter(|c| !c.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(AuthCallbackResponse {
                success: false,
                message: "No auth code provided".to_string(),
            }),
        );
    };

    match state.token_manager.initialize_token(&auth_code).await {
        Ok(_) => (
            StatusCode::OK,
            Json(AuthCallbackResponse {
                success: true,
                message: "Authentication successful".to_string(),
            }),
        ),
        Err(e) => {
            warn!("Auth code exchange failed: {}", e);
            (
                StatusCode::UNAUTHORIZED,
                Json(AuthCallbackResponse {
                    success: false,
                    message: format!("Authentication failed: {}", e),
                }),
            )
        }
    }
}
