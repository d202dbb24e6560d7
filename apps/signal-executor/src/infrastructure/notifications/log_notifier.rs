//! Notifier that writes to the log.

use async_trait::async_trait;

use crate::application::ports::{NotifierPort, NotifyError};

/// Logs every message at `info`. Used when no chat transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotifierPort for LogNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        tracing::info!(target: "notifications", message = %text, "Notification");
        Ok(())
    }
}
