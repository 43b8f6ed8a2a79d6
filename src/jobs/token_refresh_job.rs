use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::auth::TokenManager;

/// Token refresh job
///
/// Runs every 15 minutes to keep the shared Fyers credential warm. The
/// manager's single-flight refresh means this never races a session-driven
/// refresh; when re-authorization is required the failure shows up in the
/// logs long before a trading-hours session hits it.
pub struct TokenRefreshJob {
    token_manager: Arc<TokenManager>,
}

impl TokenRefreshJob {
    /// Create a new token refresh job
    pub fn new(token_manager: Arc<TokenManager>) -> Self {
        Self { token_manager }
    }

    /// Check the credential, refreshing through the manager if needed
    async fn check_token(&self) {
        match self.token_manager.get_access_token().await {
            Some(_) => tracing::debug!("Access token is valid"),
            None => tracing::warn!(
                "No valid access token and refresh failed; manual re-authorization required"
            ),
        }
    }

    /// Register this job with the scheduler
    ///
    /// Schedule: Every 15 minutes (0 */15 * * * *)
    pub async fn register(
        self,
        scheduler: &JobScheduler,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let token_manager = self.token_manager.clone();

        let job = Job::new_async("0 */15 * * * *", move |_uuid, _lock| {
            let token_manager = token_manager.clone();

            Box::pin(async move {
                let job = TokenRefreshJob { token_manager };
                job.check_token().await;
            })
        })?;

        scheduler.add(job).await?;

        tracing::info!("Token refresh job registered (runs every 15 minutes)");

        Ok(())
    }

    /// Run the check immediately (manual trigger)
    pub async fn run_now(&self) {
        self.check_token().await;
    }
}
