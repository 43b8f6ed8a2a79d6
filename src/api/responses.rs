use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Standard error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Present and true when the caller must re-run the authorization flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_required: Option<bool>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            auth_required: None,
        }
    }

    pub fn auth_required(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            auth_required: Some(true),
        }
    }
}

/// Authorization URL for the Fyers login flow
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthUrlResponse {
    pub auth_url: String,
}

/// Outcome of the authorization-code callback
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthCallbackResponse {
    pub success: bool,
    pub message: String,
}
