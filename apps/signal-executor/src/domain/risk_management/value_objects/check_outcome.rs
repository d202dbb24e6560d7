//! Risk check result types.

use serde::{Deserialize, Serialize};

/// Result of a single risk check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckOutcome {
    /// The check passed.
    Pass,
    /// The check failed.
    Fail(String),
}

impl CheckOutcome {
    /// Build a failure.
    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail(reason.into())
    }

    /// Check if this is a pass.
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Result of a whole risk chain for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskVerdict {
    /// Every check passed.
    Approved,
    /// A check failed; later checks were not evaluated.
    Rejected {
        /// Name of the failing check.
        check: String,
        /// Human-readable reason.
        reason: String,
    },
    /// A check could not be evaluated.
    Errored {
        /// Name of the check that errored.
        check: String,
        /// `Risk check error (name): cause`.
        reason: String,
        /// The cause was lost broker connectivity; the order can be retried later.
        retryable: bool,
    },
}

impl RiskVerdict {
    /// Check if the order may proceed.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    /// The blocking reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Approved => None,
            Self::Rejected { reason, .. } | Self::Errored { reason, .. } => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_helpers() {
        assert!(CheckOutcome::Pass.is_pass());
        assert_eq!(
            CheckOutcome::fail("too many"),
            CheckOutcome::Fail("too many".to_string())
        );
    }

    #[test]
    fn verdict_reason() {
        assert_eq!(RiskVerdict::Approved.reason(), None);
        let rejected = RiskVerdict::Rejected {
            check: "kill_switch".to_string(),
            reason: "Kill switch is active".to_string(),
        };
        assert!(!rejected.is_approved());
        assert_eq!(rejected.reason(), Some("Kill switch is active"));
    }

    #[test]
    fn verdict_serializes_tagged() {
        let json = serde_json::to_value(RiskVerdict::Errored {
            check: "cash_balance".to_string(),
            reason: "Risk check error (cash_balance): timeout".to_string(),
            retryable: true,
        })
        .unwrap();
        assert_eq!(json["verdict"], "ERRORED");
        assert_eq!(json["retryable"], true);
    }
}
