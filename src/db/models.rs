use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Stored in place of a password hash until an invitation is accepted.
/// Never parses as a PHC string, so no password verifies against it.
pub const PENDING_PASSWORD_HASH: &str = "PENDING";

#[derive(Debug, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    StandardUser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::StandardUser => "standard_user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "admin" => Ok(Role::Admin),
            "standard_user" => Ok(Role::StandardUser),
            _ => Err(UnknownVariant { kind: "role", value }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_active: bool,
    pub email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub invitation_token: Option<String>,
    pub invitation_sent_at: Option<DateTime<Utc>>,
    pub invitation_accepted_at: Option<DateTime<Utc>>,
    pub invited_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// A self-registered account: active immediately.
    pub fn new(email: String, name: String, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            name,
            password_hash,
            role: Role::StandardUser,
            is_active: true,
            email_verified: true,
            last_login_at: None,
            reset_token: None,
            reset_expires_at: None,
            invitation_token: None,
            invitation_sent_at: None,
            invitation_accepted_at: None,
            invited_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// An invited account: inactive and unverified, with a placeholder credential.
    pub fn invited(
        email: String,
        name: String,
        role: Role,
        invited_by: Uuid,
        token: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            role,
            is_active: false,
            email_verified: false,
            invitation_token: Some(token),
            invitation_sent_at: Some(now),
            invited_by: Some(invited_by),
            ..Self::new(email, name, PENDING_PASSWORD_HASH.to_string(), now)
        }
    }

    pub fn is_invitation_pending(&self) -> bool {
        self.invitation_token.is_some() && self.invitation_accepted_at.is_none()
    }

    pub fn has_accepted_invitation(&self) -> bool {
        self.invitation_accepted_at.is_some()
    }

    /// Token and expiry are only ever set and cleared together.
    pub fn set_reset_token(&mut self, token: String, expires_at: DateTime<Utc>) {
        self.reset_token = Some(token);
        self.reset_expires_at = Some(expires_at);
    }

    pub fn clear_reset_token(&mut self) {
        self.reset_token = None;
        self.reset_expires_at = None;
    }
}

/// Public view of an account, as returned by the boundary operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            name: account.name.clone(),
            role: account.role,
            is_active: account.is_active,
            email_verified: account.email_verified,
            last_login_at: account.last_login_at,
            created_at: account.created_at,
        }
    }
}

/// Client address and user agent a session was opened from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub ip_address: String,
    pub user_agent: String,
}

/// Column widths of `ip_address` and `user_agent`.
pub const MAX_IP_ADDRESS_LEN: usize = 45;
pub const MAX_USER_AGENT_LEN: usize = 500;

impl Origin {
    /// Values are clamped to the column widths so an oversized header can
    /// never make the attempt or session insert fail.
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: clamp(ip_address.into(), MAX_IP_ADDRESS_LEN),
            user_agent: clamp(user_agent.into(), MAX_USER_AGENT_LEN),
        }
    }
}

fn clamp(value: String, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((cut, _)) => value[..cut].to_string(),
        None => value,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        account_id: Uuid,
        access_token: String,
        refresh_token: String,
        origin: Origin,
        now: DateTime<Utc>,
        lifetime: chrono::Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            access_token,
            refresh_token,
            ip_address: origin.ip_address,
            user_agent: origin.user_agent,
            created_at: now,
            last_used_at: now,
            expires_at: now + lifetime,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Session as listed to its owner; carries no token material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            ip_address: session.ip_address.clone(),
            user_agent: session.user_agent.clone(),
            created_at: session.created_at,
            last_used_at: session.last_used_at,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    InvalidCredentials,
    RateLimited,
    AccountDeactivated,
    /// Successful attempts carry no reason.
    Empty,
}

impl FailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailReason::InvalidCredentials => "invalid_credentials",
            FailReason::RateLimited => "rate_limited",
            FailReason::AccountDeactivated => "account_deactivated",
            FailReason::Empty => "",
        }
    }
}

impl TryFrom<String> for FailReason {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "invalid_credentials" => Ok(FailReason::InvalidCredentials),
            "rate_limited" => Ok(FailReason::RateLimited),
            "account_deactivated" => Ok(FailReason::AccountDeactivated),
            "" => Ok(FailReason::Empty),
            _ => Err(UnknownVariant { kind: "fail reason", value }),
        }
    }
}

/// Append-only audit record of one login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LoginAttempt {
    pub id: Uuid,
    pub email: String,
    pub ip_address: String,
    pub success: bool,
    #[sqlx(try_from = "String")]
    pub fail_reason: FailReason,
    pub created_at: DateTime<Utc>,
}

impl LoginAttempt {
    pub fn succeeded(email: String, ip_address: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            ip_address,
            success: true,
            fail_reason: FailReason::Empty,
            created_at: now,
        }
    }

    pub fn failed(email: String, ip_address: String, reason: FailReason, now: DateTime<Utc>) -> Self {
        Self {
            success: false,
            fail_reason: reason,
            ..Self::succeeded(email, ip_address, now)
        }
    }
}
