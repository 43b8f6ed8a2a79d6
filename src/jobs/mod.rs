/// Cron jobs and scheduled tasks module
///
/// Contains background jobs that run on a schedule:
/// - Proactive access-token refresh

pub mod token_refresh_job;

pub use token_refresh_job::TokenRefreshJob;
