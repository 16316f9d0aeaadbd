//! Invitation lifecycle: `none -> pending -> accepted`, or `pending -> cancelled`.

use chrono::Duration;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::notifier::Notifier;
use crate::auth::password::CredentialStore;
use crate::auth::token::generate_opaque_token;
use crate::clock::Clock;
use crate::db::models::{Account, Role};
use crate::db::repository::Store;
use crate::error::{AppError, DatabaseError, OnboardingError};
use crate::Result;

#[derive(Clone)]
pub struct InvitationService {
    store: Arc<dyn Store>,
    credentials: CredentialStore,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    expiry: Duration,
}

impl InvitationService {
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

    /// Creates an inactive account holding a fresh invitation token.
    /// The caller is responsible for checking the inviter's role.
    pub async fn invite(
        &self,
        inviter_id: Uuid,
        email: &str,
        name: &str,
        role: Role,
    ) -> Result<(Account, String)> {
        if self.store.find_account_by_email(email).await?.is_some() {
            return Err(AppError::Conflict("User with this email already exists".into()));
        }

        let token = generate_opaque_token();
        let account = Account::invited(
            email.to_string(),
            name.to_string(),
            role,
            inviter_id,
            token.clone(),
            self.clock.now(),
        );

        self.store.insert_account(&account).await.map_err(|e| match e {
            AppError::DatabaseError(DatabaseError::Duplicate) => {
                AppError::Conflict("User with this email already exists".into())
            }
            other => other,
        })?;

        self.notifier.invitation_issued(&account.email, &token).await;
        info!("Account {} invited by {}", account.id, inviter_id);
        Ok((account, token))
    }

    /// Consumes the token and activates the account. An invitation is still
    /// valid at exactly `sent_at + expiry` and rejected one instant later.
    pub async fn accept(&self, token: &str, password: &str) -> Result<Account> {
        let mut account = self
            .store
            .find_account_by_invitation_token(token)
            .await?
            .ok_or(AppError::OnboardingError(OnboardingError::InvalidToken))?;

        if account.has_accepted_invitation() {
            return Err(AppError::OnboardingError(OnboardingError::AlreadyAccepted));
        }

        let now = self.clock.now();
        if let Some(sent_at) = account.invitation_sent_at {
            if now - sent_at > self.expiry {
                return Err(AppError::OnboardingError(OnboardingError::Expired));
            }
        }

        account.password_hash = self.credentials.hash(password).await?;
        account.invitation_token = None;
        account.invitation_accepted_at = Some(now);
        account.is_active = true;
        account.email_verified = true;
        account.updated_at = now;
        self.store.update_account(&account).await?;

        info!("Invitation accepted for account {}", account.id);
        Ok(account)
    }

    /// Issues a new token and restarts the expiry clock.
    pub async fn resend(&self, account_id: Uuid) -> Result<String> {
        let mut account = self.pending_account(account_id).await?;

        let token = generate_opaque_token();
        let now = self.clock.now();
        account.invitation_token = Some(token.clone());
        account.invitation_sent_at = Some(now);
        account.updated_at = now;
        self.store.update_account(&account).await?;

        self.notifier.invitation_issued(&account.email, &token).await;
        info!("Invitation resent for account {}", account.id);
        Ok(token)
    }

    /// Hard-deletes the never-activated account.
    pub async fn cancel(&self, account_id: Uuid) -> Result<()> {
        let account = self.pending_account(account_id).await?;
        self.store.delete_account(account.id).await?;
        info!("Invitation cancelled for account {}", account.id);
        Ok(())
    }

    pub async fn list_pending(&self) -> Result<Vec<Account>> {
        self.store.list_pending_invitations().await
    }

    async fn pending_account(&self, account_id: Uuid) -> Result<Account> {
        let account = self
            .store
            .find_account_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        if account.has_accepted_invitation() {
            return Err(AppError::OnboardingError(OnboardingError::AlreadyAccepted));
        }
        if !account.is_invitation_pending() {
            return Err(AppError::NotFound("No pending invitation for this user".into()));
        }
        Ok(account)
    }
}
