use async_trait::async_trait;
use lettre::message::{header, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::{NotificationSender, SenderError};
use crate::server::config::SmtpSettings;

/// Sends plain-text email through an SMTP relay.
pub struct EmailSender {
    from: Mailbox,
    transport: SmtpTransport,
}

impl EmailSender {
    pub fn new(settings: &SmtpSettings) -> Result<Self, SenderError> {
        if settings.host.trim().is_empty() {
            return Err(SenderError::InvalidConfiguration(
                "SMTP host is empty".to_string(),
            ));
        }
        let from: Mailbox = settings.from.parse()?;

        let builder = if settings.starttls {
            SmtpTransport::starttls_relay(&settings.host)?
        } else {
            SmtpTransport::relay(&settings.host)?
        };
        let builder = match (&settings.username, &settings.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            from,
            transport: builder.port(settings.port).build(),
        })
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Message, SenderError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())?;
        Ok(message)
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SenderError> {
        let message = self.build_message(to, subject, body)?;
        let transport = self.transport.clone();

        // SmtpTransport is blocking.
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| SenderError::SendFailed(format!("email task failed: {e}")))??;

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            from: "Monitor <monitor@example.com>".to_string(),
            starttls: true,
        }
    }

    #[test]
    fn test_build_message() {
        let sender = EmailSender::new(&settings()).unwrap();
        let message = sender
            .build_message("ops@example.com", "Website a is down", "The website a is currently down.")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: ops@example.com"));
        assert!(raw.contains("Subject: Website a is down"));
        assert!(raw.contains("The website a is currently down."));
        assert_eq!(sender.channel_name(), "email");
    }

    #[test]
    fn test_invalid_recipient() {
        let sender = EmailSender::new(&settings()).unwrap();
        assert!(matches!(
            sender.build_message("not an address", "s", "b"),
            Err(SenderError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_invalid_settings() {
        let mut bad_from = settings();
        bad_from.from = "nobody".to_string();
        assert!(EmailSender::new(&bad_from).is_err());

        let mut no_host = settings();
        no_host.host = " ".to_string();
        assert!(matches!(
            EmailSender::new(&no_host),
            Err(SenderError::InvalidConfiguration(_))
        ));
    }
}
