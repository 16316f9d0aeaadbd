use async_trait::async_trait;
use tracing::info;

/// Receives invitation and password-reset tokens for out-of-band delivery.
/// Delivery itself (email, chat, ...) lives outside this crate.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn invitation_issued(&self, email: &str, token: &str);
    async fn password_reset_requested(&self, email: &str, token: &str);
}

/// Logs that a token was issued. The token itself is not written to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn invitation_issued(&self, email: &str, _token: &str) {
        info!("Invitation token issued for {}", email);
    }

    async fn password_reset_requested(&self, email: &str, _token: &str) {
        info!("Password reset token issued for {}", email);
    }
}
