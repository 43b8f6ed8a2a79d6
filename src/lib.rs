// Library Crate Root
// lib.rs

pub mod api;
pub mod auth;
pub mod database;
pub mod fyers;
pub mod jobs;
pub mod websocket;

// pub use = re-export at crate root
pub use api::{create_router, ApiState};
pub use auth::{AuthError, TokenManager};
pub use database::repositories::{InMemoryTokenRepository, TokenRepository};
pub use fyers::{FyersConfig, FyersFeedConnector};
pub use websocket::WsState;
