/// Credential lifecycle for the shared Fyers token
///
/// The manager is the single owner of "which token is current". It is
/// injected into sessions and REST handlers rather than living in global
/// state, and its refresh path is single-flight so concurrent callers
/// never race the upstream token endpoint.

pub mod errors;
pub mod token_manager;

pub use errors::AuthError;
pub use token_manager::{TokenManager, TOKEN_GRACE_PERIOD_MINUTES};
