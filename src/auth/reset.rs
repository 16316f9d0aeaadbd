//! Password recovery: `none -> pending -> none`.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::auth::notifier::Notifier;
use crate::auth::password::CredentialStore;
use crate::auth::token::generate_opaque_token;
use crate::clock::Clock;
use crate::db::repository::Store;
use crate::error::{AppError, OnboardingError};
use crate::Result;

/// The only acknowledgment a reset request ever produces.
pub const RESET_REQUESTED_MESSAGE: &str = "If the email exists, a password reset link has been sent";

#[derive(Clone)]
pub struct PasswordResetService {
    store: Arc<dyn Store>,
    credentials: CredentialStore,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    expiry: Duration,
}

impl PasswordResetService {
    pub fn new(
        store: Arc<dyn Store>,
        credentials: CredentialStore,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        expiry: Duration,
    ) -> Self {
        Self {
            store,
            credentials,
            notifier,
            clock,
            expiry,
        }
    }

    /// Stores a reset token when the email belongs to an account. The outcome
    /// is invisible to the caller: both paths return the same message. A
    /// failed lookup surfaces before existence is known; a failed write after
    /// a hit is only logged.
    pub async fn request(&self, email: &str) -> Result<&'static str> {
        let Some(mut account) = self.store.find_account_by_email(email).await? else {
            debug!("Password reset requested for unknown email");
            return Ok(RESET_REQUESTED_MESSAGE);
        };

        let token = generate_opaque_token();
        let now = self.clock.now();
        account.set_reset_token(token.clone(), now + self.expiry);
        account.updated_at = now;
        if let Err(e) = self.store.update_account(&account).await {
            error!("Failed to store reset token for account {}: {}", account.id, e);
            return Ok(RESET_REQUESTED_MESSAGE);
        }

        self.notifier.password_reset_requested(&account.email, &token).await;
        info!("Password reset token issued for account {}", account.id);
        Ok(RESET_REQUESTED_MESSAGE)
    }

    /// Does not open a session; the user logs in with the new password.
    pub async fn confirm(&self, token: &str, new_password: &str) -> Result<()> {
        let mut account = self
            .store
            .find_account_by_reset_token(token)
            .await?
            .ok_or(AppError::OnboardingError(OnboardingError::InvalidToken))?;

        let now = self.clock.now();
        match account.reset_expires_at {
            Some(expires_at) if now < expires_at => {}
            _ => return Err(AppError::OnboardingError(OnboardingError::Expired)),
        }

        account.password_hash = self.credentials.hash(new_password).await?;
        account.clear_reset_token();
        account.updated_at = now;
        self.store.update_account(&account).await?;

        info!("Password reset completed for account {}", account.id);
        Ok(())
    }
}
