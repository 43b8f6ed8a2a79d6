/// Fyers broker integration
///
/// REST token endpoints, the quotes API, and the push-streaming data
/// socket adapter that bridges broker events into client sessions.

pub mod auth_api;
pub mod config;
pub mod feed;
pub mod messages;
pub mod quotes;
pub mod reconnect;

pub use auth_api::FyersAuthClient;
pub use config::FyersConfig;
pub use feed::{FeedConnector, FeedError, FeedHandle, FyersFeedConnector};
pub use messages::{DataType, FeedEvent, SymbolSpec};
pub use quotes::FyersQuotesClient;
