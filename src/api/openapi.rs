use utoipa::OpenApi;

use crate::api::handlers;
use crate::api::responses::*;
use crate::fyers::quotes::{QuoteValues, SymbolQuote};

/// OpenAPI specification
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stock Stream API",
        version = "1.0.0",
        description = "Real-time Fyers market-data relay with managed credentials",
    ),
    paths(
        handlers::health_check,
        handlers::get_quotes,
        handlers::get_quote_by_symbol,
        handlers::get_auth_login,
        handlers::auth_callback,
    ),
    components(
        schemas(
            SymbolQuote,
            QuoteValues,
            ErrorResponse,
            AuthUrlResponse,
            AuthCallbackResponse,
        )
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Quotes", description = "Broker quote lookup"),
        (name = "Auth", description = "Fyers authorization-code flow"),
    )
)]
pub struct ApiDoc;
