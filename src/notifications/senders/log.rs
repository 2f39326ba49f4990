use async_trait::async_trait;
use tracing::info;

use super::{NotificationSender, SenderError};

/// Writes notifications to the log instead of delivering them. Used when no
/// SMTP relay is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SenderError> {
        info!(to, subject, body, "Notification (SMTP not configured, logged only).");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
