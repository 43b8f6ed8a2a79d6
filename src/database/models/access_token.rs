use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Access token entity - one issued Fyers credential
///
/// The table is an append-only log: a refresh inserts a new row and the
/// previous row is superseded, never updated or deleted. "Current" means
/// the most-recently-created row that is still valid.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::database::schema::access_tokens)]
#[diesel(primary_key(id))]
pub struct AccessToken {
    /// Auto-incrementing ID
    pub id: i64,

    /// The bearer token presented to Fyers REST and streaming APIs
    pub access_token: String,

    /// Refresh token issued alongside, if any
    pub refresh_token: Option<String>,

    /// When the access token stops being accepted upstream
    pub expires_at: DateTime<Utc>,

    /// When this record was inserted
    pub created_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token outlives `cutoff`.
    ///
    /// Callers pass `now + grace_period` so that a token about to lapse is
    /// never handed out and then rejected upstream moments later.
    pub fn is_valid_at(&self, cutoff: DateTime<Utc>) -> bool {
        self.expires_at > cutoff
    }
}

/// New token record for insertion
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::access_tokens)]
pub struct NewAccessToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl NewAccessToken {
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }
}
