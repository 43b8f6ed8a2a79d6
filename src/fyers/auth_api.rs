//! Fyers OAuth token endpoints
//!
//! Exchanges a one-time authorization code for a token pair and refreshes
//! expired access tokens. Responses follow the broker's v3 shape:
//! `{"s":"ok"|"error","code":...,"message":...,"access_token":...}`.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::config::FyersConfig;
use crate::auth::errors::AuthError;

/// Token lifetime when the broker omits `expires_in` (24 hours)
const DEFAULT_TOKEN_TTL_SECS: i64 = 86_400;

/// A freshly issued token pair, not yet persisted
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    s: String,
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn is_ok(&self) -> bool {
        self.s == "ok"
    }

    fn into_grant(self) -> Result<TokenGrant, AuthError> {
        let access_token = self
            .access_token
            .ok_or_else(|| AuthError::InvalidResponse("missing access_token".to_string()))?;
        let ttl = self.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);

        Ok(TokenGrant {
            access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + Duration::seconds(ttl),
        })
    }
}

/// Client for the Fyers authorization-code and refresh-token endpoints
pub struct FyersAuthClient {
    http: reqwest::Client,
    config: Arc<FyersConfig>,
}

impl FyersAuthClient {
    pub fn new(config: Arc<FyersConfig>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// URL an administrator visits to start the authorization-code flow
    pub fn authorization_url(&self) -> String {
        format!(
            "{}/generate-authcode?client_id={}&redirect_uri={}&response_type=code&state=None",
            self.config.rest_base_url, self.config.client_id, self.config.redirect_uri
        )
    }

    /// Exchange a one-time authorization code for a token pair
    pub async fn exchange_auth_code(&self, auth_code: &str) -> Result<TokenGrant, AuthError> {
        let body = serde_json::json!({
            "grant_type": "authorization_code",
            "appIdHash": self.app_id_hash(),
            "code": auth_code,
        });

        let response: TokenResponse = self
            .http
            .post(format!("{}/validate-authcode", self.config.rest_base_url))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !response.is_ok() {
            return Err(AuthError::AuthExchange {
                code: response.code,
                message: response.message,
            });
        }

        response.into_grant()
    }

    /// Exchange a refresh token for a new token pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let mut body = serde_json::json!({
            "grant_type": "refresh_token",
            "appIdHash": self.app_id_hash(),
            "refresh_token": refresh_token,
        });
        if let Some(pin) = &self.config.pin {
            body["pin"] = pin.clone().into();
        }

        let response: TokenResponse = self
            .http
            .post(format!(
                "{}/validate-refresh-token",
                self.config.rest_base_url
            ))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !response.is_ok() {
            return Err(AuthError::Refresh {
                code: response.code,
                message: response.message,
            });
        }

        // The broker may rotate the refresh token; keep the old one otherwise
        let mut grant = response.into_grant()?;
        if grant.refresh_token.is_none() {
            grant.refresh_token = Some(refresh_token.to_string());
        }
        Ok(grant)
    }

    /// `sha256(client_id + ":" + secret_key)`, required by both endpoints
    fn app_id_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}", self.config.client_id, self.config.secret_key));
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(rest_base_url: String) -> Arc<FyersConfig> {
        Arc::new(FyersConfig {
            client_id: "APP-100".to_string(),
            secret_key: "secret".to_string(),
            redirect_uri: "http://localhost:8000/api/v1/auth/callback".to_string(),
            pin: None,
            rest_base_url,
            data_base_url: String::new(),
            feed_url: String::new(),
        })
    }

    #[tokio::test]
    async fn test_exchange_auth_code_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/validate-authcode"))
            .and(body_partial_json(
                serde_json::json!({"grant_type": "authorization_code", "code": "abc"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "s": "ok",
                "code": 200,
                "access_token": "fresh-token",
                "refresh_token": "fresh-refresh",
                "expires_in": 86400,
            })))
            .mount(&server)
            .await;

        let client = FyersAuthClient::new(test_config(server.uri()));
        let grant = client.exchange_auth_code("abc").await.unwrap();

        assert_eq!(grant.access_token, "fresh-token");
        assert_eq!(grant.refresh_token.as_deref(), Some("fresh-refresh"));
        assert!(grant.expires_at > Utc::now() + Duration::hours(23));
    }

    #[tokio::test]
    async fn test_exchange_rejected_code_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/validate-authcode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "s": "error",
                "code": -413,
                "message": "Invalid auth code",
            })))
            .mount(&server)
            .await;

        let client = FyersAuthClient::new(test_config(server.uri()));
        let err = client.exchange_auth_code("stale").await.unwrap_err();

        assert!(matches!(err, AuthError::AuthExchange { code: -413, .. }));
        assert!(err.requires_reauthorization());
    }

    #[tokio::test]
    async fn test_refresh_keeps_old_refresh_token_when_not_rotated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/validate-refresh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "s": "ok",
                "access_token": "rotated-access",
            })))
            .mount(&server)
            .await;

        let client = FyersAuthClient::new(test_config(server.uri()));
        let grant = client.refresh("keep-me").await.unwrap();

        assert_eq!(grant.access_token, "rotated-access");
        assert_eq!(grant.refresh_token.as_deref(), Some("keep-me"));
    }

    #[tokio::test]
    async fn test_refresh_rejection_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/validate-refresh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "s": "error",
                "code": -8,
                "message": "Refresh token expired",
            })))
            .mount(&server)
            .await;

        let client = FyersAuthClient::new(test_config(server.uri()));
        let err = client.refresh("expired").await.unwrap_err();

        assert!(matches!(err, AuthError::Refresh { .. }));
        assert!(err.requires_reauthorization());
    }

    #[test]
    fn test_authorization_url_contains_app_identity() {
        let client = FyersAuthClient::new(test_config("https://api.example".to_string()));
        let url = client.authorization_url();

        assert!(url.starts_with("https://api.example/generate-authcode?"));
        assert!(url.contains("client_id=APP-100"));
        assert!(url.contains("response_type=code"));
    }
}
