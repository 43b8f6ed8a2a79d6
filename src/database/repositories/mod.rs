/// Repository pattern implementations for the token store
///
/// Traits define the contract; the PostgreSQL implementation backs
/// production and the in-memory implementation backs tests and
/// database-less deployments.

pub mod token_repository;

pub use token_repository::{InMemoryTokenRepository, TokenRepository, TokenRepositoryImpl};
