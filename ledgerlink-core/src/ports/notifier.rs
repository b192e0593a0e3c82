//! Notifier port - delivery of user-facing notifications

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::Notification;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name for logs ("webhook", "log")
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> Result<()>;
}
