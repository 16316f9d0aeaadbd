use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::invitation::InvitationService;
use crate::auth::notifier::Notifier;
use crate::auth::password::{CredentialStore, HashCost};
use crate::auth::rate_limit::{RateLimitConfig, RateLimiter};
use crate::auth::reset::PasswordResetService;
use crate::auth::session::SessionRegistry;
use crate::auth::token::TokenIssuer;
use crate::clock::Clock;
use crate::config::Settings;
use crate::db::models::{
    Account, AccountSummary, FailReason, Origin, Role, SessionSummary,
};
use crate::db::repository::Store;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::Result;

/// Returned by every operation that opens a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub account: AccountSummary,
}

/// Identity established by the authorization gate for one request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: Uuid,
    pub email: String,
    pub role: Role,
    pub session_id: Uuid,
    pub access_token: String,
}

impl AuthContext {
    pub fn require_role(&self, allowed: &[Role]) -> Result<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::AuthError(AuthError::InsufficientRole))
        }
    }
}

/// The credential and session lifecycle engine, as seen by the HTTP layer.
pub struct AuthService {
    store: Arc<dyn Store>,
    credentials: CredentialStore,
    tokens: TokenIssuer,
    sessions: SessionRegistry,
    limiter: RateLimiter,
    invitations: InvitationService,
    resets: PasswordResetService,
    clock: Arc<dyn Clock>,
    min_password_length: usize,
}

impl AuthService {
    pub fn new(
        settings: &Settings,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let auth = &settings.auth;
        let credentials = CredentialStore::new(
            HashCost {
                memory_kib: auth.hash_memory_kib,
                iterations: auth.hash_iterations,
                parallelism: auth.hash_parallelism,
            },
            auth.max_concurrent_hashes,
        )?;
        let tokens = TokenIssuer::new(
            &auth.jwt_secret,
            clock.clone(),
            Duration::hours(auth.access_token_expiry_hours),
            Duration::days(auth.refresh_token_expiry_days),
        );
        let sessions = SessionRegistry::new(
            store.clone(),
            clock.clone(),
            Duration::days(auth.session_lifetime_days),
        );
        let limiter = RateLimiter::new(
            store.clone(),
            clock.clone(),
            RateLimitConfig {
                window_size: Duration::minutes(settings.rate_limit.window_minutes),
                max_failures: settings.rate_limit.max_failures,
            },
        );
        let invitations = InvitationService::new(
            store.clone(),
            credentials.clone(),
            notifier.clone(),
            clock.clone(),
            Duration::days(auth.invitation_expiry_days),
        );
        let resets = PasswordResetService::new(
            store.clone(),
            credentials.clone(),
            notifier,
            clock.clone(),
            Duration::hours(auth.reset_expiry_hours),
        );

        Ok(Self {
            store,
            credentials,
            tokens,
            sessions,
            limiter,
            invitations,
            resets,
            clock,
            min_password_length: auth.min_password_length,
        })
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        origin: Origin,
    ) -> Result<AuthResponse> {
        validate_email(email)?;
        validate_name(name)?;
        self.validate_password(password)?;

        if self.store.find_account_by_email(email).await?.is_some() {
            return Err(AppError::Conflict("User with this email already exists".into()));
        }

        let password_hash = self.credentials.hash(password).await?;
        let account = Account::new(email.to_string(), name.to_string(), password_hash, self.clock.now());
        self.store.insert_account(&account).await.map_err(|e| match e {
            AppError::DatabaseError(DatabaseError::Duplicate) => {
                AppError::Conflict("User with this email already exists".into())
            }
            other => other,
        })?;
        info!("Registered account {}", account.id);

        self.open_session(&account, origin).await
    }

    /// Throttled per (email, origin address). A throttled attempt is
    /// rejected before credentials are checked and is not itself recorded.
    pub async fn login(&self, email: &str, password: &str, origin: Origin) -> Result<AuthResponse> {
        if email.trim().is_empty() {
            return Err(AppError::ValidationError("Email is required".into()));
        }

        self.limiter.check(email, &origin.ip_address).await?;

        let outcome = self.verify_login(email, password, origin.clone()).await;

        let recorded = match &outcome {
            Ok(_) => self.limiter.record_success(email, &origin.ip_address).await,
            Err(AppError::AuthError(AuthError::InvalidCredentials)) => {
                self.record_failure(email, &origin, FailReason::InvalidCredentials).await
            }
            Err(AppError::AuthError(AuthError::AccountDeactivated)) => {
                self.record_failure(email, &origin, FailReason::AccountDeactivated).await
            }
            // Storage and hashing faults do not count toward the lockout.
            Err(e) => {
                error!("Login for {} from {} aborted: {}", email, origin.ip_address, e);
                Ok(())
            }
        };
        if let Err(e) = recorded {
            error!("Failed to record login attempt for {}: {}", email, e);
        }

        outcome
    }

    async fn record_failure(&self, email: &str, origin: &Origin, reason: FailReason) -> Result<()> {
        warn!("Login failed for {} from {}: {}", email, origin.ip_address, reason.as_str());
        self.limiter.record_failure(email, &origin.ip_address, reason).await
    }

    async fn verify_login(&self, email: &str, password: &str, origin: Origin) -> Result<AuthResponse> {
        let mut account = self
            .store
            .find_account_by_email(email)
            .await?
            .ok_or(AppError::AuthError(AuthError::InvalidCredentials))?;

        if !self.credentials.verify(password, &account.password_hash).await? {
            return Err(AppError::AuthError(AuthError::InvalidCredentials));
        }
        if !account.is_active {
            return Err(AppError::AuthError(AuthError::AccountDeactivated));
        }

        self.sessions.purge_expired_for(account.id).await?;

        let now = self.clock.now();
        account.last_login_at = Some(now);
        account.updated_at = now;
        self.store.update_account(&account).await?;

        info!("Login successful for account {}", account.id);
        self.open_session(&account, origin).await
    }

    /// Needs only a verified token bound to a live session. The account's
    /// active flag is not consulted, so a deactivated user can still sign out.
    pub async fn logout(&self, access_token: &str) -> Result<()> {
        let claims = self.tokens.validate(access_token)?;
        let session = self.sessions.find_by_access_token(access_token).await?;
        if session.account_id != claims.sub {
            return Err(AppError::AuthError(AuthError::SessionRevoked));
        }

        self.sessions.revoke_by_access_token(&session.access_token).await?;
        info!("Logged out session {} for account {}", session.id, session.account_id);
        Ok(())
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<&'static str> {
        self.resets.request(email).await
    }

    pub async fn confirm_password_reset(&self, token: &str, new_password: &str) -> Result<()> {
        self.validate_password(new_password)?;
        self.resets.confirm(token, new_password).await
    }

    /// Mints a new access token for the session holding `refresh_token`.
    /// The refresh token itself and the session's expiry are unchanged.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<String> {
        let claims = self.tokens.validate(refresh_token)?;
        let session = self.sessions.find_by_refresh_token(refresh_token, claims.sub).await?;
        let account = self
            .store
            .find_account_by_id(session.account_id)
            .await?
            .ok_or(AppError::AuthError(AuthError::SessionRevoked))?;

        let access_token = self.tokens.issue_access_token(&account)?;
        self.sessions.refresh(&session, access_token.clone()).await?;
        info!("Refreshed access token for session {}", session.id);
        Ok(access_token)
    }

    pub async fn get_active_sessions(&self, account_id: Uuid) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.list_active(account_id).await?;
        Ok(sessions.iter().map(SessionSummary::from).collect())
    }

    pub async fn revoke_session(&self, account_id: Uuid, session_id: Uuid) -> Result<()> {
        self.sessions.revoke(session_id, account_id).await
    }

    pub async fn revoke_other_sessions(&self, account_id: Uuid, keep_token: &str) -> Result<u64> {
        self.sessions.revoke_all_except(account_id, keep_token).await
    }

    pub async fn invite_user(
        &self,
        ctx: &AuthContext,
        email: &str,
        name: &str,
        role: Role,
    ) -> Result<String> {
        ctx.require_role(&[Role::Admin])?;
        validate_email(email)?;
        validate_name(name)?;

        let (_, token) = self.invitations.invite(ctx.account_id, email, name, role).await?;
        Ok(token)
    }

    /// Acceptance counts as a login: a session is opened straight away.
    pub async fn accept_invitation(
        &self,
        token: &str,
        password: &str,
        origin: Origin,
    ) -> Result<AuthResponse> {
        self.validate_password(password)?;
        let account = self.invitations.accept(token, password).await?;
        self.open_session(&account, origin).await
    }

    pub async fn resend_invitation(&self, ctx: &AuthContext, account_id: Uuid) -> Result<String> {
        ctx.require_role(&[Role::Admin])?;
        self.invitations.resend(account_id).await
    }

    pub async fn cancel_invitation(&self, ctx: &AuthContext, account_id: Uuid) -> Result<()> {
        ctx.require_role(&[Role::Admin])?;
        self.invitations.cancel(account_id).await
    }

    pub async fn list_pending_invitations(&self, ctx: &AuthContext) -> Result<Vec<Account>> {
        ctx.require_role(&[Role::Admin])?;
        self.invitations.list_pending().await
    }

    pub async fn change_password(
        &self,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        self.validate_password(new_password)?;
        let mut account = self.account(account_id).await?;

        if !self.credentials.verify(current_password, &account.password_hash).await? {
            return Err(AppError::AuthError(AuthError::InvalidCredentials));
        }

        account.password_hash = self.credentials.hash(new_password).await?;
        account.updated_at = self.clock.now();
        self.store.update_account(&account).await?;
        info!("Password changed for account {}", account.id);
        Ok(())
    }

    pub async fn get_profile(&self, account_id: Uuid) -> Result<AccountSummary> {
        let account = self.account(account_id).await?;
        Ok(AccountSummary::from(&account))
    }

    /// The authorization gate: the token must verify and be bound to a live
    /// session whose account still exists and is active.
    pub async fn authenticate(&self, access_token: &str) -> Result<AuthContext> {
        let claims = self.tokens.validate(access_token)?;
        let session = self.sessions.find_by_access_token(access_token).await?;
        if session.account_id != claims.sub {
            return Err(AppError::AuthError(AuthError::SessionRevoked));
        }

        let account = self
            .store
            .find_account_by_id(session.account_id)
            .await?
            .ok_or(AppError::AuthError(AuthError::SessionRevoked))?;
        if !account.is_active {
            return Err(AppError::AuthError(AuthError::AccountDeactivated));
        }

        Ok(AuthContext {
            account_id: account.id,
            email: account.email,
            role: account.role,
            session_id: session.id,
            access_token: session.access_token,
        })
    }

    /// Gate plus role check against an allow-list.
    pub async fn authorize(&self, access_token: &str, allowed: &[Role]) -> Result<AuthContext> {
        let ctx = self.authenticate(access_token).await?;
        ctx.require_role(allowed)?;
        Ok(ctx)
    }

    async fn open_session(&self, account: &Account, origin: Origin) -> Result<AuthResponse> {
        let pair = self.tokens.issue_pair(account)?;
        self.sessions
            .create(account, pair.access_token.clone(), pair.refresh_token.clone(), origin)
            .await?;

        Ok(AuthResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            account: AccountSummary::from(account),
        })
    }

    async fn account(&self, account_id: Uuid) -> Result<Account> {
        self.store
            .find_account_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    fn validate_password(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.min_password_length {
            return Err(AppError::ValidationError(format!(
                "Password must be at least {} characters",
                self.min_password_length
            )));
        }
        Ok(())
    }
}

fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!("Invalid email address: {}", email)))
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::ValidationError("Name is required".into()));
    }
    Ok(())
}
