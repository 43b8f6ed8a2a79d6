use thiserror::Error;

/// Default Fyers v3 REST base URL (token endpoints)
pub const DEFAULT_REST_BASE_URL: &str = "https://api-t1.fyers.in/api/v3";

/// Default Fyers v3 data REST base URL (quotes)
pub const DEFAULT_DATA_BASE_URL: &str = "https://api-t1.fyers.in/data";

/// Default Fyers data socket URL
pub const DEFAULT_FEED_URL: &str = "wss://socket.fyers.in/hsm/v1-5/prod";

/// Fyers application credentials and endpoint configuration
///
/// Base URLs are overridable through the environment so tests can point the
/// clients at a local mock server.
#[derive(Debug, Clone)]
pub struct FyersConfig {
    /// Fyers app id (e.g. "ABCD1234-100")
    pub client_id: String,
    pub secret_key: String,
    pub redirect_uri: String,
    /// Trading PIN, required by the refresh endpoint for some account types
    pub pin: Option<String>,
    pub rest_base_url: String,
    pub data_base_url: String,
    pub feed_url: String,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
}

impl FyersConfig {
    /// Build configuration from the process environment
    ///
    /// Requires `FYERS_CLIENT_ID`, `FYERS_SECRET_KEY` and
    /// `FYERS_REDIRECT_URI`; everything else has defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: require("FYERS_CLIENT_ID")?,
            secret_key: require("FYERS_SECRET_KEY")?,
            redirect_uri: require("FYERS_REDIRECT_URI")?,
            pin: std::env::var("FYERS_PIN").ok().filter(|v| !v.is_empty()),
            rest_base_url: var_or("FYERS_REST_BASE_URL", DEFAULT_REST_BASE_URL),
            data_base_url: var_or("FYERS_DATA_BASE_URL", DEFAULT_DATA_BASE_URL),
            feed_url: var_or("FYERS_FEED_URL", DEFAULT_FEED_URL),
        })
    }

    /// Data socket URL carrying the credential, Fyers style:
    /// `access_token=<client_id>:<token>`
    pub fn feed_url_with_token(&self, access_token: &str) -> String {
        format!(
            "{}?access_token={}:{}",
            self.feed_url, self.client_id, access_token
        )
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
