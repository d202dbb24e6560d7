//! HTTP response DTOs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::use_cases::IntakeOutcome;
use crate::domain::ledger::{PositionLot, TradeRecord};
use crate::domain::order_queue::Lane;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
}

/// Intake result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalResponse {
    /// `queued` or `duplicate`.
    pub status: String,
    /// Canonical idempotency key.
    pub idempotency_key: String,
    /// Lane the order went to, when queued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lane: Option<Lane>,
    /// Queue position, when queued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
}

impl From<IntakeOutcome> for SignalResponse {
    fn from(outcome: IntakeOutcome) -> Self {
        match outcome {
            IntakeOutcome::Queued { key, lane, seq } => Self {
                status: "queued".to_string(),
                idempotency_key: key.into_inner(),
                lane: Some(lane),
                seq: Some(seq),
            },
            IntakeOutcome::Duplicate { key } => Self {
                status: "duplicate".to_string(),
                idempotency_key: key.into_inner(),
                lane: None,
                seq: None,
            },
        }
    }
}

/// Control command result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Command applied.
    pub command: String,
    /// Confirmation text.
    pub message: String,
}

/// Queue clear result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearQueueResponse {
    /// Orders removed.
    pub removed: u64,
}

/// Open lots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsResponse {
    /// OPEN lots, oldest first.
    pub lots: Vec<PositionLot>,
    /// Summed entry amount.
    pub total_invested: Decimal,
}

impl PositionsResponse {
    /// Wrap `lots` with their total.
    #[must_use]
    pub fn new(lots: Vec<PositionLot>) -> Self {
        let total_invested = lots.iter().map(|l| l.entry_amount).sum();
        Self {
            lots,
            total_invested,
        }
    }
}

/// Recent trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradesResponse {
    /// Trades, newest first.
    pub trades: Vec<TradeRecord>,
}
