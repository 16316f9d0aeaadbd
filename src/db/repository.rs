//! The narrow storage interface every component is constructed with.
//!
//! Implementations must enforce uniqueness of account email, account
//! invitation token, session access token and session refresh token,
//! reporting violations as `DatabaseError::Duplicate`. Each method is a
//! single atomic unit from the caller's point of view.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::models::{Account, LoginAttempt, Session};
use crate::Result;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_account(&self, account: &Account) -> Result<()>;
    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>>;
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>>;
    async fn find_account_by_invitation_token(&self, token: &str) -> Result<Option<Account>>;
    async fn find_account_by_reset_token(&self, token: &str) -> Result<Option<Account>>;
    /// Overwrites every mutable column. `DatabaseError::NotFound` if the row is gone.
    async fn update_account(&self, account: &Account) -> Result<()>;
    async fn delete_account(&self, id: Uuid) -> Result<bool>;
    /// Newest invitation first.
    async fn list_pending_invitations(&self) -> Result<Vec<Account>>;

    async fn insert_session(&self, session: &Session) -> Result<()>;
    async fn find_session_by_access_token(&self, token: &str) -> Result<Option<Session>>;
    async fn find_session_by_refresh_token(
        &self,
        token: &str,
        account_id: Uuid,
    ) -> Result<Option<Session>>;
    /// Sessions with `expires_at > now`, most recently used first.
    async fn list_sessions(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<Vec<Session>>;
    /// Swaps the access token and touches `last_used_at`; `expires_at` is untouched.
    async fn rotate_access_token(
        &self,
        session_id: Uuid,
        access_token: &str,
        last_used_at: DateTime<Utc>,
    ) -> Result<bool>;
    async fn delete_session(&self, session_id: Uuid, account_id: Uuid) -> Result<bool>;
    async fn delete_session_by_access_token(&self, token: &str) -> Result<bool>;
    async fn delete_sessions_except(&self, account_id: Uuid, keep_access_token: &str) -> Result<u64>;
    async fn delete_expired_sessions_for(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<u64>;
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn insert_login_attempt(&self, attempt: &LoginAttempt) -> Result<()>;
    /// Failed attempts for the pair with `created_at > since`.
    async fn count_failed_attempts(
        &self,
        email: &str,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64>;
    async fn delete_attempts_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
