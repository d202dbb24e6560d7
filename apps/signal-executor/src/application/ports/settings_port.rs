//! Settings Port (Driven Port)

use async_trait::async_trait;

use super::PersistenceError;
use crate::domain::risk_management::RiskSettings;

/// Port for the single active [`RiskSettings`] row.
#[async_trait]
pub trait SettingsPort: Send + Sync {
    /// Read the current settings.
    async fn load(&self) -> Result<RiskSettings, PersistenceError>;

    /// Replace every field.
    async fn save(&self, settings: &RiskSettings) -> Result<(), PersistenceError>;

    /// Set the soft-stop flag.
    async fn set_paused(&self, paused: bool) -> Result<(), PersistenceError>;

    /// Set the hard-stop flag.
    async fn set_killed(&self, killed: bool) -> Result<(), PersistenceError>;
}
