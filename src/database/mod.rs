/// Database module for the durable access-token store
///
/// This module provides:
/// - Connection pooling for PostgreSQL
/// - Repository pattern over the append-only token log
/// - Database models and schema
/// - Diesel ORM integration

pub mod connection;
pub mod models;
pub mod repositories;
pub mod schema;

pub use connection::{establish_connection_pool, DatabaseError, PgPool};
