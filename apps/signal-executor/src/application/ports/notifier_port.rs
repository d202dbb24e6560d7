//! Notifier Port (Driven Port)
//!
//! Outbound operator messages. Delivery is best effort: callers bound
//! each call with a timeout and only log failures.

use std::time::Duration;

use async_trait::async_trait;

/// Upper bound on a single delivery attempt.
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification delivery errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    /// Transport failed.
    #[error("notification transport error: {0}")]
    Transport(String),

    /// The remote service refused the message.
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Port for operator notifications.
#[async_trait]
pub trait NotifierPort: Send + Sync {
    /// Deliver a plain-text message.
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Deliver `text`, logging instead of failing.
pub async fn notify_best_effort<N: NotifierPort + ?Sized>(notifier: &N, text: &str) {
    match tokio::time::timeout(NOTIFY_TIMEOUT, notifier.notify(text)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Notification failed"),
        Err(_) => tracing::warn!("Notification timed out"),
    }
}
