use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::models::{Account, Origin, Session};
use crate::db::repository::Store;
use crate::error::{AppError, AuthError};
use crate::Result;

/// Durable record of issued sessions. A session is the source of truth for
/// revocation: a token that validates but has no live session is rejected.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, lifetime: Duration) -> Self {
        Self {
            store,
            clock,
            lifetime,
        }
    }

    pub async fn create(
        &self,
        account: &Account,
        access_token: String,
        refresh_token: String,
        origin: Origin,
    ) -> Result<Session> {
        let session = Session::new(
            account.id,
            access_token,
            refresh_token,
            origin,
            self.clock.now(),
            self.lifetime,
        );
        self.store.insert_session(&session).await?;
        debug!("Created session {} for account {}", session.id, account.id);
        Ok(session)
    }

    /// Only returns sessions that have not yet reached `expires_at`.
    pub async fn find_by_access_token(&self, token: &str) -> Result<Session> {
        let session = self
            .store
            .find_session_by_access_token(token)
            .await?
            .ok_or_else(|| AppError::AuthError(AuthError::SessionRevoked))?;

        if session.is_expired(self.clock.now()) {
            return Err(AppError::AuthError(AuthError::SessionExpired));
        }
        Ok(session)
    }

    pub async fn find_by_refresh_token(&self, token: &str, account_id: Uuid) -> Result<Session> {
        let session = self
            .store
            .find_session_by_refresh_token(token, account_id)
            .await?
            .ok_or_else(|| AppError::AuthError(AuthError::SessionRevoked))?;

        if session.is_expired(self.clock.now()) {
            return Err(AppError::AuthError(AuthError::SessionExpired));
        }
        Ok(session)
    }

    pub async fn list_active(&self, account_id: Uuid) -> Result<Vec<Session>> {
        self.store.list_sessions(account_id, self.clock.now()).await
    }

    /// Another account's session is indistinguishable from a missing one.
    pub async fn revoke(&self, session_id: Uuid, account_id: Uuid) -> Result<()> {
        if self.store.delete_session(session_id, account_id).await? {
            info!("Revoked session {} for account {}", session_id, account_id);
            Ok(())
        } else {
            Err(AppError::NotFound("Session not found".into()))
        }
    }

    pub async fn revoke_by_access_token(&self, token: &str) -> Result<bool> {
        self.store.delete_session_by_access_token(token).await
    }

    /// Deletes every session of the account except the one holding `keep_token`.
    pub async fn revoke_all_except(&self, account_id: Uuid, keep_token: &str) -> Result<u64> {
        let removed = self.store.delete_sessions_except(account_id, keep_token).await?;
        info!("Revoked {} other sessions for account {}", removed, account_id);
        Ok(removed)
    }

    /// Rotates the access token in place. `expires_at` is left alone, so a
    /// session never outlives its original window.
    pub async fn refresh(&self, session: &Session, new_access_token: String) -> Result<Session> {
        let now = self.clock.now();
        if !self
            .store
            .rotate_access_token(session.id, &new_access_token, now)
            .await?
        {
            return Err(AppError::AuthError(AuthError::SessionRevoked));
        }

        Ok(Session {
            access_token: new_access_token,
            last_used_at: now,
            ..session.clone()
        })
    }

    pub async fn purge_expired_for(&self, account_id: Uuid) -> Result<u64> {
        let removed = self
            .store
            .delete_expired_sessions_for(account_id, self.clock.now())
            .await?;
        if removed > 0 {
            debug!("Purged {} expired sessions for account {}", removed, account_id);
        }
        Ok(removed)
    }
}
