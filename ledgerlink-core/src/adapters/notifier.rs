//! Notifier adapters
//!
//! - `WebhookNotifier` posts the notification payload as JSON
//! - `LogNotifier` writes it to the diagnostic log (no webhook configured)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::result::{Error, ProviderError, Result};
use crate::domain::Notification;
use crate::ports::Notifier;

pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::config(format!("Invalid notification webhook URL: {}", url)));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let response = self.client.post(&self.url).json(notification).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::transient(format!(
                "Notification webhook returned HTTP {}",
                status.as_u16()
            ))
            .into());
        }
        Ok(())
    }
}

/// Writes notifications to the tracing log
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            user_id = %notification.user_id,
            kind = %notification.notification_type,
            title = %notification.title,
            "{}",
            notification.message
        );
        Ok(())
    }
}
