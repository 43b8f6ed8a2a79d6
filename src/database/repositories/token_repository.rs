use crate::database::connection::{DatabaseError, PgPooledConnection};
use crate::database::models::{AccessToken, NewAccessToken};
use crate::database::schema::access_tokens;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Token repository trait - defines interface for access token records
///
/// The store is append-only: `insert` adds a new record, nothing mutates
/// existing rows. Queries resolve "current" as newest-created-first.
pub trait TokenRepository: Send + Sync {
    /// Insert a new token record
    fn insert(&self, new_token: NewAccessToken) -> Result<AccessToken, DatabaseError>;

    /// Get the most recent token that is still valid past `cutoff`
    /// (callers pass `now + grace_period`)
    fn latest_valid(&self, cutoff: DateTime<Utc>) -> Result<Option<AccessToken>, DatabaseError>;

    /// Get the most recent token overall, valid or not
    /// (used to find the refresh token after the access token has expired)
    fn latest(&self) -> Result<Option<AccessToken>, DatabaseError>;
}

/// Concrete implementation of TokenRepository backed by PostgreSQL
pub struct TokenRepositoryImpl {
    get_conn: Arc<dyn Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync>,
}

impl TokenRepositoryImpl {
    /// Create new token repository with connection provider
    pub fn new<F>(get_conn: F) -> Self
    where
        F: Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync + 'static,
    {
        Self {
            get_conn: Arc::new(get_conn),
        }
    }
}

impl TokenRepository for TokenRepositoryImpl {
    fn insert(&self, new_token: NewAccessToken) -> Result<AccessToken, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        diesel::insert_into(access_tokens::table)
            .values(&new_token)
            .get_result::<AccessToken>(&mut conn)
            .map_err(DatabaseError::from)
    }

    fn latest_valid(&self, cutoff: DateTime<Utc>) -> Result<Option<AccessToken>, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        access_tokens::table
            .filter(access_tokens::expires_at.gt(cutoff))
            .order((access_tokens::created_at.desc(), access_tokens::id.desc()))
            .first::<AccessToken>(&mut conn)
            .optional()
            .map_err(DatabaseError::from)
    }

    fn latest(&self) -> Result<Option<AccessToken>, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        access_tokens::table
            .order((access_tokens::created_at.desc(), access_tokens::id.desc()))
            .first::<AccessToken>(&mut conn)
            .optional()
            .map_err(DatabaseError::from)
    }
}

/// In-memory implementation of TokenRepository
///
/// Backs deployments without DATABASE_URL (tokens then live only for the
/// lifetime of the process) and the test suite.
#[derive(Default)]
pub struct InMemoryTokenRepository {
    records: parking_lot::Mutex<Vec<AccessToken>>,
    next_id: AtomicI64,
}

impl InMemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records (for tests asserting append-only behavior)
    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }
}

impl TokenRepository for InMemoryTokenRepository {
    fn insert(&self, new_token: NewAccessToken) -> Result<AccessToken, DatabaseError> {
        let record = AccessToken {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            access_token: new_token.access_token,
            refresh_token: new_token.refresh_token,
            expires_at: new_token.expires_at,
            created_at: Utc::now(),
        };
        self.records.lock().push(record.clone());
        Ok(record)
    }

    fn latest_valid(&self, cutoff: DateTime<Utc>) -> Result<Option<AccessToken>, DatabaseError> {
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|t| t.is_valid_at(cutoff))
            .max_by_key(|t| (t.created_at, t.id))
            .cloned())
    }

    fn latest(&self) -> Result<Option<AccessToken>, DatabaseError> {
        Ok(self
            .records
            .lock()
            .iter()
            .max_by_key(|t| (t.created_at, t.id))
            .cloned())
    }
}
