//! Broker session alerts.
//!
//! Forwards gateway events to the operator. Exhausting the reconnect
//! budget is the one event that needs a human.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::application::ports::{NotifierPort, notify_best_effort};
use crate::application::services::GatewayEvent;

/// Operator text for a gateway event, if it deserves one.
#[must_use]
pub fn alert_text(event: &GatewayEvent) -> Option<String> {
    match event {
        GatewayEvent::Connected => Some("Broker connected".to_string()),
        GatewayEvent::Disconnected { reason } => {
            Some(format!("Broker disconnected: {reason}. Reconnecting."))
        }
        GatewayEvent::ReconnectAttempt { .. } => None,
        GatewayEvent::Reconnected { attempts } => {
            Some(format!("Broker reconnected after {attempts} attempt(s)"))
        }
        GatewayEvent::ReconnectExhausted { attempts } => Some(format!(
            "CRITICAL: broker reconnect failed after {attempts} attempts. Manual intervention required."
        )),
    }
}

/// Forward `events` to `notifier` until `shutdown` is cancelled.
pub async fn forward_session_alerts(
    mut events: broadcast::Receiver<GatewayEvent>,
    notifier: Arc<dyn NotifierPort>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(event) => {
                if matches!(event, GatewayEvent::ReconnectExhausted { .. }) {
                    error!(severity = "critical", ?event, "Broker session lost for good");
                }
                if let Some(text) = alert_text(&event) {
                    notify_best_effort(notifier.as_ref(), &text).await;
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Session alerts lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
