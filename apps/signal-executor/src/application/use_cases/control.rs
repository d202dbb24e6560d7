//! Control Use Case
//!
//! Operator commands: soft stop, hard stop, limit changes, and the queue
//! emergency clear. Everything is written to the settings store and picked
//! up by the next dequeue.

use std::sync::Arc;

use tracing::{info, warn};

use crate::application::ports::{
    NotifierPort, OrderQueuePort, PersistenceError, SettingsPort, notify_best_effort,
};
use crate::domain::risk_management::{RiskSettings, RiskSettingsPatch, SettingsError};

/// Settings update failures.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The patched limits are out of range.
    #[error(transparent)]
    Invalid(#[from] SettingsError),

    /// The settings store failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// An operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Block BUYs; SELLs continue.
    Pause,
    /// Undo `Pause`.
    Resume,
    /// Block every order.
    Kill,
    /// Undo `Kill`.
    Unkill,
}

impl ControlCommand {
    /// Parse a command name as used in URLs.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pause" => Some(Self::Pause),
            "resume" => Some(Self::Resume),
            "kill" => Some(Self::Kill),
            "unkill" => Some(Self::Unkill),
            _ => None,
        }
    }

    const fn confirmation(self) -> &'static str {
        match self {
            Self::Pause => "Buying paused. Sells continue.",
            Self::Resume => "Buying resumed.",
            Self::Kill => "EMERGENCY STOP: all trading halted.",
            Self::Unkill => "Emergency stop lifted.",
        }
    }
}

/// Use case for operator commands.
pub struct ControlUseCase<Q, S>
where
    Q: OrderQueuePort,
    S: SettingsPort,
{
    queue: Arc<Q>,
    settings: Arc<S>,
    notifier: Arc<dyn NotifierPort>,
}

impl<Q, S> ControlUseCase<Q, S>
where
    Q: OrderQueuePort,
    S: SettingsPort,
{
    /// Create a new ControlUseCase.
    pub fn new(queue: Arc<Q>, settings: Arc<S>, notifier: Arc<dyn NotifierPort>) -> Self {
        Self {
            queue,
            settings,
            notifier,
        }
    }

    /// Apply `command` and announce it.
    ///
    /// # Errors
    ///
    /// Fails when the settings store rejects the write.
    pub async fn apply(&self, command: ControlCommand) -> Result<&'static str, PersistenceError> {
        match command {
            ControlCommand::Pause => self.settings.set_paused(true).await?,
            ControlCommand::Resume => self.settings.set_paused(false).await?,
            ControlCommand::Kill => self.settings.set_killed(true).await?,
            ControlCommand::Unkill => self.settings.set_killed(false).await?,
        }
        let text = command.confirmation();
        warn!(?command, "Control command applied");
        notify_best_effort(self.notifier.as_ref(), text).await;
        Ok(text)
    }

    /// Apply `patch` to the stored limits and return the result.
    ///
    /// # Errors
    ///
    /// `Invalid` when a patched limit is out of range; nothing is written.
    pub async fn update_settings(
        &self,
        patch: &RiskSettingsPatch,
    ) -> Result<RiskSettings, ControlError> {
        let current = self.settings.load().await?;
        if patch.is_empty() {
            return Ok(current);
        }
        let next = patch.apply(&current);
        next.validate()?;
        self.settings.save(&next).await?;

        info!(?patch, "Risk settings updated");
        notify_best_effort(
            self.notifier.as_ref(),
            &format!(
                "Risk settings updated\nBuy amount: ${}\nMax open: {}\nMax daily buys: {}\nMax per ticker: {}",
                next.buy_amount, next.max_open_positions, next.max_daily_buys, next.max_per_ticker
            ),
        )
        .await;
        Ok(next)
    }

    /// Drop every queued order. Returns the count removed.
    ///
    /// # Errors
    ///
    /// Fails when the queue cannot be cleared.
    pub async fn clear_queue(&self) -> Result<u64, PersistenceError> {
        let removed = self.queue.clear_all().await?;
        warn!(removed, "Order queue cleared");
        notify_best_effort(
            self.notifier.as_ref(),
            &format!("Order queue cleared: {removed} order(s) removed"),
        )
        .await;
        Ok(removed)
    }
}
