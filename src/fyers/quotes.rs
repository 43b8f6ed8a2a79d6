//! Fyers quotes REST API
//!
//! Stateless request/response wrapper over the broker's quote endpoint,
//! OHLCV flagged. Used by the REST surface, not by the streaming path.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

use super::config::FyersConfig;

/// Errors from the quote endpoint
#[derive(Debug, Error)]
pub enum QuotesError {
    #[error("Quote request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The broker no longer accepts the credential
    #[error("API token is invalid or expired")]
    Unauthorized,

    #[error("Broker rejected quote request: {message}")]
    Rejected { code: i32, message: String },
}

/// Per-symbol quote as returned by the broker
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SymbolQuote {
    /// Exchange-qualified symbol name
    pub n: String,
    /// Per-symbol status
    pub s: String,
    /// Quote values
    pub v: QuoteValues,
}

/// OHLCV-flagged quote values
///
/// Field names follow the broker's wire format so the payload round-trips
/// unchanged to API consumers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuoteValues {
    /// Last traded price
    #[serde(default)]
    pub lp: Option<Decimal>,
    #[serde(default)]
    pub open_price: Option<Decimal>,
    #[serde(default)]
    pub high_price: Option<Decimal>,
    #[serde(default)]
    pub low_price: Option<Decimal>,
    #[serde(default)]
    pub prev_close_price: Option<Decimal>,
    #[serde(default)]
    pub volume: Option<Decimal>,
    /// Absolute change since previous close
    #[serde(default)]
    pub ch: Option<Decimal>,
    /// Percent change since previous close
    #[serde(default)]
    pub chp: Option<Decimal>,
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    /// Last trade time (epoch seconds)
    #[serde(default)]
    pub tt: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct QuotesEnvelope {
    s: String,
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
    d: Option<Vec<SymbolQuote>>,
}

/// Client for the broker quote-lookup endpoint
pub struct FyersQuotesClient {
    http: reqwest::Client,
    config: Arc<FyersConfig>,
}

impl FyersQuotesClient {
    pub fn new(config: Arc<FyersConfig>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Fetch quotes for a list of exchange-qualified symbols
    pub async fn quotes(
        &self,
        access_token: &str,
        symbols: &[String],
    ) -> Result<Vec<SymbolQuote>, QuotesError> {
        let response = self
            .http
            .get(format!("{}/quotes", self.config.data_base_url))
            .query(&[
                ("symbols", symbols.join(",")),
                ("ohlcv_flag", "1".to_string()),
            ])
            .header(
                reqwest::header::AUTHORIZATION,
                format!("{}:{}", self.config.client_id, access_token),
            )
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(QuotesError::Unauthorized);
        }

        let envelope: QuotesEnvelope = response.json().await?;
        if envelope.s != "ok" {
            // The broker reports credential problems in the message body
            if envelope.message.contains("Invalid token")
                || envelope.message.contains("Unauthorized")
            {
                return Err(QuotesError::Unauthorized);
            }
            return Err(QuotesError::Rejected {
                code: envelope.code,
                message: envelope.message,
            });
        }

        Ok(envelope.d.unwrap_or_default())
    }
}

/// Qualify a bare ticker as an NSE equity symbol
///
/// Symbols that already carry an exchange prefix pass through unchanged.
pub fn qualify_symbol(symbol: &str) -> String {
    if symbol.contains(':') {
        symbol.to_string()
    } else {
        format!("NSE:{}-EQ", symbol)
    }
}
