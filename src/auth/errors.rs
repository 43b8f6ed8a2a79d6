//! Error types for the credential lifecycle
//!
//! Terminal variants mean a human has to re-run the authorization-code
//! flow; the rest are transient and clear up on a later request.

use thiserror::Error;

use crate::database::DatabaseError;

/// Errors that can occur while obtaining or refreshing the Fyers credential
#[derive(Debug, Error)]
pub enum AuthError {
    /// The broker rejected the one-time authorization code
    #[error("Authorization code rejected: {message}")]
    AuthExchange { code: i32, message: String },

    /// The broker rejected the refresh token (expired or revoked)
    #[error("Refresh token rejected: {message}")]
    Refresh { code: i32, message: String },

    /// No stored token is valid and the refresh path is exhausted
    #[error("No valid credential available; re-authorization required")]
    NoValidCredential,

    /// Transport failure talking to the token endpoints
    #[error("Token endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Token store failure
    #[error("Token store error: {0}")]
    Store(#[from] DatabaseError),

    /// The broker replied "ok" without the fields we need
    #[error("Malformed token response: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    /// True when retrying cannot help - a human must re-authorize
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            AuthError::AuthExchange { .. } | AuthError::Refresh { .. } | AuthError::NoValidCredential
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::Refresh {
            code: -8,
            message: "refresh token expired".to_string(),
        };
        assert_eq!(err.to_string(), "Refresh token rejected: refresh token expired");
    }

    #[test]
    fn test_terminal_errors_require_reauthorization() {
        assert!(AuthError::AuthExchange {
            code: -413,
            message: "invalid auth code".to_string()
        }
        .requires_reauthorization());
        assert!(AuthError::Refresh {
            code: -8,
            message: "revoked".to_string()
        }
        .requires_reauthorization());
        assert!(AuthError::NoValidCredential.requires_reauthorization());

        let transient = AuthError::InvalidResponse("missing access_token".to_string());
        assert!(!transient.requires_reauthorization());
    }
}
