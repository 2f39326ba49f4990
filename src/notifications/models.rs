use serde::{Deserialize, Serialize};

/// Subject and body templates for status-change emails. Rendered with tera;
/// `{{ name }}` and `{{ url }}` are available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationTemplates {
    pub up_subject: String,
    pub up_body: String,
    pub down_subject: String,
    pub down_body: String,
}

impl Default for NotificationTemplates {
    fn default() -> Self {
        Self {
            up_subject: "Website {{ name }} is back up".to_string(),
            up_body: "The website {{ name }} is now back up. URL: {{ url }}".to_string(),
            down_subject: "Website {{ name }} is down".to_string(),
            down_body: "The website {{ name }} is currently down. URL: {{ url }}".to_string(),
        }
    }
}

/// A rendered message ready for a sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}
