use std::sync::Arc;

use tera::{Context, Tera};
use thiserror::Error;
use tracing::{error, info};

use super::models::NotificationTemplates;
use super::senders::{NotificationSender, SenderError};
use crate::db::entities::website;
use crate::monitor::transition::StatusChange;

const TEST_SUBJECT: &str = "Test Email from Website Monitoring System";
const TEST_BODY: &str = "This is a test email sent from the Website Monitoring System. \
If you received this email, it means the test was successful.";

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Templating error: {0}")]
    Template(#[from] tera::Error),
    #[error("Sender error: {0}")]
    Sender(#[from] SenderError),
}

/// Renders status-change messages and hands them to the configured sender.
#[derive(Clone)]
pub struct NotificationService {
    sender: Arc<dyn NotificationSender>,
    templates: NotificationTemplates,
}

impl NotificationService {
    pub fn new(sender: Arc<dyn NotificationSender>, templates: NotificationTemplates) -> Self {
        Self { sender, templates }
    }

    pub fn channel_name(&self) -> &str {
        self.sender.channel_name()
    }

    /// Returns the subject and body for a status change of `website`.
    pub fn render(
        &self,
        website: &website::Model,
        change: StatusChange,
    ) -> Result<(String, String), NotificationError> {
        let (subject, body) = match change {
            StatusChange::Up => (&self.templates.up_subject, &self.templates.up_body),
            StatusChange::Down => (&self.templates.down_subject, &self.templates.down_body),
        };

        let mut context = Context::new();
        context.insert("name", &website.name);
        context.insert("url", &website.url);

        Ok((
            Tera::one_off(subject, &context, false)?,
            Tera::one_off(body, &context, false)?,
        ))
    }

    /// Sends the status-change message. Failures are logged and reported as
    /// `false`; they never reach the caller as errors.
    pub async fn notify_status_change(
        &self,
        to: &str,
        website: &website::Model,
        change: StatusChange,
    ) -> bool {
        let result = match self.render(website, change) {
            Ok((subject, body)) => self
                .sender
                .send(to, &subject, &body)
                .await
                .map_err(NotificationError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(
                    website_id = website.id,
                    ?change,
                    channel = self.channel_name(),
                    "Status change notification sent."
                );
                true
            }
            Err(e) => {
                error!(
                    website_id = website.id,
                    ?change,
                    channel = self.channel_name(),
                    error = %e,
                    "Failed to send status change notification."
                );
                false
            }
        }
    }

    pub async fn send_test_email(&self, to: &str) -> Result<(), NotificationError> {
        self.sender.send(to, TEST_SUBJECT, TEST_BODY).await?;
        info!(to, channel = self.channel_name(), "Test email sent.");
        Ok(())
    }
}
