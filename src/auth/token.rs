use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::models::{Account, Role};
use crate::error::{AppError, AuthError};
use crate::Result;

/// Bytes of entropy in invitation and reset tokens.
const OPAQUE_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid, // Account ID
    pub email: String,
    pub role: Role,
    pub exp: i64, // Expiration time
    pub iat: i64, // Issued at
    pub jti: Uuid, // Keeps tokens minted in the same second distinct
}

/// An access/refresh token pair minted from one claim set.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Mints and validates signed bearer tokens. Access and refresh tokens share
/// one structure and one verification path; only their lifetime differs.
/// Validity here says nothing about revocation; that is the session registry's job.
/// `iat` and `exp` are read from and checked against the injected clock.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Arc<dyn Clock>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(
        secret: &str,
        clock: Arc<dyn Clock>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            clock,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue_access_token(&self, account: &Account) -> Result<String> {
        self.sign(account, self.access_ttl)
    }

    pub fn issue_refresh_token(&self, account: &Account) -> Result<String> {
        self.sign(account, self.refresh_ttl)
    }

    pub fn issue_pair(&self, account: &Account) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(account)?,
            refresh_token: self.issue_refresh_token(account)?,
        })
    }

    /// Fails with `AuthError::InvalidToken` on a bad signature, bad structure or
    /// once `now >= exp`.
    pub fn validate(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let claims = decode::<Claims>(token, &self.decoding_key, &validation)?.claims;

        if self.clock.now().timestamp() >= claims.exp {
            return Err(AppError::AuthError(AuthError::InvalidToken));
        }
        Ok(claims)
    }

    fn sign(&self, account: &Account, ttl: Duration) -> Result<String> {
        let now = self.clock.now();
        let claims = Claims {
            sub: account.id,
            email: account.email.clone(),
            role: account.role,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(token)
    }
}

/// 256 bits from the OS RNG, URL-safe base64 encoded.
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; OPAQUE_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
