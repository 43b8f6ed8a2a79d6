use std::sync::Arc;

use stock_stream_api::api::ApiState;
use stock_stream_api::auth::TokenManager;
use stock_stream_api::database::repositories::{
    InMemoryTokenRepository, TokenRepository, TokenRepositoryImpl,
};
use stock_stream_api::fyers::{
    FyersAuthClient, FyersConfig, FyersFeedConnector, FyersQuotesClient,
};
use stock_stream_api::websocket::WsState;
use stock_stream_api::{create_router, jobs::TokenRefreshJob};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stock_stream_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Fyers app credentials and endpoints
    let config = match FyersConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Token store: PostgreSQL when configured, otherwise in-memory
    let repository = initialize_token_store();

    // Credential manager - the single owner of "which token is current"
    let token_manager = Arc::new(TokenManager::new(
        repository,
        FyersAuthClient::new(Arc::clone(&config)),
    ));

    // Quote lookup client
    let quotes = Arc::new(FyersQuotesClient::new(Arc::clone(&config)));

    // One data socket connection per browser session
    let connector = Arc::new(FyersFeedConnector::new(Arc::clone(&config)));

    // Default subscription set for new sessions
    let default_symbols = default_symbols_from_env();
    tracing::info!("📊 Default subscription set: {:?}", default_symbols);

    // Keep the credential warm in the background
    initialize_cron_scheduler(token_manager.clone()).await;

    let ws_state = Arc::new(WsState {
        token_manager: token_manager.clone(),
        connector,
        default_symbols,
    });
    let api_state = ApiState {
        token_manager,
        quotes,
    };

    let app = create_router(api_state, ws_state);

    // Define the address
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();

    tracing::info!("🚀 Stock Stream API server running on http://{}", addr);
    tracing::info!("📚 Swagger UI: http://{}/swagger-ui", addr);
    tracing::info!("🔌 WebSocket: ws://{}/ws/stocks", addr);
    tracing::info!("🔑 Authorize: http://{}/api/v1/auth/login", addr);
    tracing::info!("");
    tracing::info!("📡 WebSocket command examples:");
    tracing::info!(r#"   {{"action":"subscribe","symbols":["NSE:SBIN-EQ"]}}"#);
    tracing::info!(
        r#"   {{"action":"unsubscribe","symbols":["NSE:SBIN-EQ"],"data_type":"SymbolUpdate"}}"#
    );
    tracing::info!("");

    // Start the server
    axum::serve(listener, app).await.unwrap();
}

/// Initialize the token store (optional - PostgreSQL only if DATABASE_URL is set)
fn initialize_token_store() -> Arc<dyn TokenRepository> {
    use stock_stream_api::database::establish_connection_pool;

    let Some(database_url) = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty())
    else {
        tracing::warn!("🗄️  DATABASE_URL not set; tokens will not survive a restart");
        return Arc::new(InMemoryTokenRepository::new());
    };

    let pool_size = std::env::var("DB_POOL_MAX_SIZE")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(5);

    match establish_connection_pool(&database_url, pool_size) {
        Ok(pool) => {
            tracing::info!("✅ Token store connected (PostgreSQL)");
            Arc::new(TokenRepositoryImpl::new(move || {
                pool.get().map_err(|e| {
                    stock_stream_api::database::DatabaseError::ConnectionPoolError(e.to_string())
                })
            }))
        }
        Err(e) => {
            tracing::error!("❌ Failed to connect token store: {}", e);
            tracing::warn!("⚠️  Falling back to in-memory token store");
            Arc::new(InMemoryTokenRepository::new())
        }
    }
}

/// Default subscription set from DEFAULT_SYMBOLS (comma-separated)
fn default_symbols_from_env() -> Vec<String> {
    std::env::var("DEFAULT_SYMBOLS")
        .unwrap_or_else(|_| "NSE:ADANIENT-EQ".to_string())
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Initialize cron scheduler for periodic jobs
async fn initialize_cron_scheduler(token_manager: Arc<TokenManager>) {
    use tokio_cron_scheduler::JobScheduler;

    tracing::info!("⏰ Initializing cron scheduler...");

    let scheduler = match JobScheduler::new().await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            tracing::error!("❌ Failed to create cron scheduler: {}", e);
            return;
        }
    };

    let refresh_job = TokenRefreshJob::new(token_manager);
    if let Err(e) = refresh_job.register(&scheduler).await {
        tracing::error!("❌ Failed to register token refresh job: {}", e);
        return;
    }

    if let Err(e) = scheduler.start().await {
        tracing::error!("❌ Failed to start cron scheduler: {}", e);
        return;
    }

    tracing::info!("✅ Cron scheduler started");
    tracing::info!("   • Token refresh: Every 15 minutes");

    // Keep scheduler alive (it will run in the background)
    std::mem::forget(scheduler);
}
