use chrono::Duration;
use std::sync::Arc;
use tracing::warn;

use crate::clock::Clock;
use crate::db::models::{FailReason, LoginAttempt};
use crate::db::repository::Store;
use crate::error::{AppError, AuthError};
use crate::Result;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_size: Duration,
    pub max_failures: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_size: Duration::minutes(15),
            max_failures: 5,
        }
    }
}

/// Sliding-window counter of failed logins per (declared email, client address).
///
/// State lives entirely in the store's attempt log, so the limiter holds no
/// memory of its own and any number of server instances agree on the count.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: RateLimitConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Errors with `RateLimited` once the pair has reached the failure budget.
    /// Nothing is recorded for a rejected check.
    pub async fn check(&self, email: &str, ip_address: &str) -> Result<()> {
        let since = self.clock.now() - self.config.window_size;
        let failures = self
            .store
            .count_failed_attempts(email, ip_address, since)
            .await?;

        if failures >= u64::from(self.config.max_failures) {
            warn!("Login rate limited for {} from {}", email, ip_address);
            return Err(AppError::AuthError(AuthError::RateLimited));
        }
        Ok(())
    }

    pub async fn record_success(&self, email: &str, ip_address: &str) -> Result<()> {
        let attempt = LoginAttempt::succeeded(email.to_string(), ip_address.to_string(), self.clock.now());
        self.store.insert_login_attempt(&attempt).await
    }

    pub async fn record_failure(&self, email: &str, ip_address: &str, reason: FailReason) -> Result<()> {
        let attempt = LoginAttempt::failed(
            email.to_string(),
            ip_address.to_string(),
            reason,
            self.clock.now(),
        );
        self.store.insert_login_attempt(&attempt).await
    }
}
