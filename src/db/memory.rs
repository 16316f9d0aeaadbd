//! In-process [`Store`] for tests and the `memory` storage backend.
//!
//! All tables sit behind one lock so each trait method is atomic, and the
//! same uniqueness constraints as the PostgreSQL schema are enforced.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{Account, LoginAttempt, Session};
use crate::db::repository::Store;
use crate::error::{AppError, DatabaseError};
use crate::Result;

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    sessions: HashMap<Uuid, Session>,
    login_attempts: Vec<LoginAttempt>,
}

impl Tables {
    fn account_conflicts(&self, candidate: &Account) -> bool {
        self.accounts.values().any(|existing| {
            existing.id != candidate.id
                && (existing.email == candidate.email
                    || (candidate.invitation_token.is_some()
                        && existing.invitation_token == candidate.invitation_token))
        })
    }

    fn session_conflicts(&self, candidate: &Session) -> bool {
        self.sessions.values().any(|existing| {
            existing.id == candidate.id
                || existing.access_token == candidate.access_token
                || existing.refresh_token == candidate.refresh_token
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }

    /// Every recorded attempt, oldest first.
    pub async fn login_attempts(&self) -> Vec<LoginAttempt> {
        self.tables.read().await.login_attempts.clone()
    }
}

fn duplicate() -> AppError {
    AppError::DatabaseError(DatabaseError::Duplicate)
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_account(&self, account: &Account) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.accounts.contains_key(&account.id) || tables.account_conflicts(account) {
            return Err(duplicate());
        }
        tables.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_account_by_invitation_token(&self, token: &str) -> Result<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .find(|a| a.invitation_token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_account_by_reset_token(&self, token: &str) -> Result<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .find(|a| a.reset_token.as_deref() == Some(token))
            .cloned())
    }

    async fn update_account(&self, account: &Account) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.accounts.contains_key(&account.id) {
            return Err(AppError::DatabaseError(DatabaseError::NotFound));
        }
        if tables.account_conflicts(account) {
            return Err(duplicate());
        }
        tables.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn delete_account(&self, id: Uuid) -> Result<bool> {
        Ok(self.tables.write().await.accounts.remove(&id).is_some())
    }

    async fn list_pending_invitations(&self) -> Result<Vec<Account>> {
        let tables = self.tables.read().await;
        let mut pending: Vec<Account> = tables
            .accounts
            .values()
            .filter(|a| a.is_invitation_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.invitation_sent_at.cmp(&a.invitation_sent_at));
        Ok(pending)
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.session_conflicts(session) {
            return Err(duplicate());
        }
        tables.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_session_by_access_token(&self, token: &str) -> Result<Option<Session>> {
        let tables = self.tables.read().await;
        Ok(tables.sessions.values().find(|s| s.access_token == token).cloned())
    }

    async fn find_session_by_refresh_token(
        &self,
        token: &str,
        account_id: Uuid,
    ) -> Result<Option<Session>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.refresh_token == token && s.account_id == account_id)
            .cloned())
    }

    async fn list_sessions(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<Vec<Session>> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<Session> = tables
            .sessions
            .values()
            .filter(|s| s.account_id == account_id && s.expires_at > now)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        Ok(sessions)
    }

    async fn rotate_access_token(
        &self,
        session_id: Uuid,
        access_token: &str,
        last_used_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let taken = tables
            .sessions
            .values()
            .any(|s| s.id != session_id && s.access_token == access_token);
        if taken {
            return Err(duplicate());
        }
        match tables.sessions.get_mut(&session_id) {
            Some(session) => {
                session.access_token = access_token.to_string();
                session.last_used_at = last_used_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_session(&self, session_id: Uuid, account_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .sessions
            .get(&session_id)
            .is_some_and(|s| s.account_id == account_id);
        if owned {
            tables.sessions.remove(&session_id);
        }
        Ok(owned)
    }

    async fn delete_session_by_access_token(&self, token: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.access_token != token);
        Ok(tables.sessions.len() < before)
    }

    async fn delete_sessions_except(&self, account_id: Uuid, keep_access_token: &str) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables
            .sessions
            .retain(|_, s| s.account_id != account_id || s.access_token == keep_access_token);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn delete_expired_sessions_for(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables
            .sessions
            .retain(|_, s| s.account_id != account_id || s.expires_at >= now);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.expires_at >= now);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn insert_login_attempt(&self, attempt: &LoginAttempt) -> Result<()> {
        self.tables.write().await.login_attempts.push(attempt.clone());
        Ok(())
    }

    async fn count_failed_attempts(
        &self,
        email: &str,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let tables = self.tables.read().await;
        let count = tables
            .login_attempts
            .iter()
            .filter(|a| {
                !a.success && a.email == email && a.ip_address == ip_address && a.created_at > since
            })
            .count();
        Ok(count as u64)
    }

    async fn delete_attempts_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.login_attempts.len();
        tables.login_attempts.retain(|a| a.created_at >= cutoff);
        Ok((before - tables.login_attempts.len()) as u64)
    }
}
