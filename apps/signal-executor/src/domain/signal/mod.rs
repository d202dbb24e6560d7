//! Signal Bounded Context
//!
//! An inbound alert saying "BUY ticker" or "SELL ticker". Signals are
//! validated and given a canonical idempotency key before anything is
//! persisted or queued.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{IdempotencyKey, OrderSide, ParseSideError, Ticker, TickerError};

/// Longest caller-supplied idempotency key accepted.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 100;

/// Raw signal fields as supplied by the alert source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRequest {
    /// `BUY` or `SELL` (case-insensitive).
    pub action: String,
    /// Ticker, optionally prefixed with `EXCHANGE:`.
    pub ticker: String,
    /// Alert price, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Caller-supplied idempotency key (alert id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Free-form source tag for the audit row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Signal validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    /// Action is not BUY or SELL.
    #[error(transparent)]
    InvalidAction(#[from] ParseSideError),

    /// Ticker failed validation.
    #[error("invalid ticker: {0}")]
    InvalidTicker(#[from] TickerError),

    /// Caller key exceeds [`MAX_IDEMPOTENCY_KEY_LEN`].
    #[error("idempotency key is {len} characters, max is {MAX_IDEMPOTENCY_KEY_LEN}")]
    KeyTooLong {
        /// Supplied length.
        len: usize,
    },
}

/// A validated signal ready for intake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    /// Buy or sell.
    pub action: OrderSide,
    /// Canonical ticker.
    pub ticker: Ticker,
    /// Alert price, if supplied.
    pub price: Option<Decimal>,
    /// Canonical idempotency key.
    pub idempotency_key: IdempotencyKey,
    /// When the signal arrived.
    pub received_at: DateTime<Utc>,
    /// Source tag.
    pub source: Option<String>,
    /// Original request serialized as JSON, kept for audit.
    pub raw_payload: String,
}

impl Signal {
    /// Validate a raw request received at `received_at`.
    pub fn from_request(
        request: &SignalRequest,
        received_at: DateTime<Utc>,
    ) -> Result<Self, SignalError> {
        let action: OrderSide = request.action.parse()?;
        let ticker = Ticker::parse(&request.ticker)?;

        let idempotency_key = match request
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
        {
            Some(key) => {
                let len = key.chars().count();
                if len > MAX_IDEMPOTENCY_KEY_LEN {
                    return Err(SignalError::KeyTooLong { len });
                }
                IdempotencyKey::new(key)
            }
            None => derive_idempotency_key(action, &ticker, received_at),
        };

        let raw_payload = serde_json::to_string(request).unwrap_or_default();

        Ok(Self {
            action,
            ticker,
            price: request.price,
            idempotency_key,
            received_at,
            source: request.source.clone(),
            raw_payload,
        })
    }
}

/// Derive `ACTION_TICKER_YYYYMMDDHHMM` for signals without a caller key.
///
/// Two alerts for the same action and ticker within one UTC minute
/// collapse to the same key.
#[must_use]
pub fn derive_idempotency_key(
    action: OrderSide,
    ticker: &Ticker,
    at: DateTime<Utc>,
) -> IdempotencyKey {
    IdempotencyKey::new(format!(
        "{}_{}_{}",
        action.as_str(),
        ticker.as_str(),
        at.format("%Y%m%d%H%M")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(action: &str, ticker: &str, key: Option<&str>) -> SignalRequest {
        SignalRequest {
            action: action.to_string(),
            ticker: ticker.to_string(),
            price: None,
            idempotency_key: key.map(str::to_string),
            source: Some("tradingview".to_string()),
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, h, m, s).unwrap()
    }

    #[test]
    fn derives_key_from_minute() {
        let signal = Signal::from_request(&request("buy", "NASDAQ:AAPL", None), at(14, 30, 12)).unwrap();
        assert_eq!(signal.idempotency_key.as_str(), "BUY_AAPL_202601051430");
        assert_eq!(signal.action, OrderSide::Buy);
        assert_eq!(signal.ticker.as_str(), "AAPL");
    }

    #[test]
    fn same_minute_collapses_to_same_key() {
        let a = Signal::from_request(&request("SELL", "MSFT", None), at(9, 31, 0)).unwrap();
        let b = Signal::from_request(&request("SELL", "MSFT", None), at(9, 31, 59)).unwrap();
        let c = Signal::from_request(&request("SELL", "MSFT", None), at(9, 32, 0)).unwrap();
        assert_eq!(a.idempotency_key, b.idempotency_key);
        assert_ne!(a.idempotency_key, c.idempotency_key);
    }

    #[test]
    fn caller_key_wins_and_blank_key_is_ignored() {
        let supplied = Signal::from_request(&request("BUY", "AAPL", Some(" alert-77 ")), at(10, 0, 0)).unwrap();
        assert_eq!(supplied.idempotency_key.as_str(), "alert-77");

        let blank = Signal::from_request(&request("BUY", "AAPL", Some("  ")), at(10, 0, 0)).unwrap();
        assert_eq!(blank.idempotency_key.as_str(), "BUY_AAPL_202601051000");
    }

    #[test]
    fn rejects_bad_action_and_ticker() {
        assert!(matches!(
            Signal::from_request(&request("HOLD", "AAPL", None), at(10, 0, 0)),
            Err(SignalError::InvalidAction(_))
        ));
        assert!(matches!(
            Signal::from_request(&request("BUY", "AAPL$", None), at(10, 0, 0)),
            Err(SignalError::InvalidTicker(_))
        ));
    }

    #[test]
    fn rejects_overlong_key() {
        let key = "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        assert!(matches!(
            Signal::from_request(&request("BUY", "AAPL", Some(&key)), at(10, 0, 0)),
            Err(SignalError::KeyTooLong { .. })
        ));
    }

    #[test]
    fn keeps_raw_payload() {
        let signal = Signal::from_request(&request("BUY", "AAPL", None), at(10, 0, 0)).unwrap();
        assert!(signal.raw_payload.contains("\"ticker\":\"AAPL\""));
        assert!(signal.raw_payload.contains("tradingview"));
    }
}
