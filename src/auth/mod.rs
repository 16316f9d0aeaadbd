//! Authentication module
//!
//! Credential hashing, token issuance, the session registry, login
//! throttling, invitations and password recovery, composed by
//! [`AuthService`] and exposed over HTTP by [`handlers`].

pub mod handlers;
pub mod invitation;
pub mod notifier;
pub mod password;
pub mod rate_limit;
pub mod reset;
pub mod service;
pub mod session;
pub mod token;

pub use invitation::InvitationService;
pub use notifier::{LogNotifier, Notifier};
pub use password::{CredentialStore, HashCost};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use reset::{PasswordResetService, RESET_REQUESTED_MESSAGE};
pub use service::{AuthContext, AuthResponse, AuthService};
pub use session::SessionRegistry;
pub use token::{Claims, TokenIssuer, TokenPair};
