use async_trait::async_trait;
use thiserror::Error;

pub mod email;
pub mod log;

pub use self::email::EmailSender;
pub use self::log::LogSender;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Invalid email address: {0}")]
    InvalidAddress(#[from] lettre::address::AddressError),
    #[error("Failed to build email: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// A channel that can deliver a plain-text message to an address.
/// Delivery is best effort: callers log failures and move on.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SenderError>;

    fn channel_name(&self) -> &str;
}
