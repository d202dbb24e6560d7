//! Reconciliation Bounded Context
//!
//! Compares broker-reported positions with the local ledger and reports
//! every ticker whose quantities disagree. Reporting only; nothing here
//! mutates either side.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Quantities closer than this are treated as equal.
pub const QTY_TOLERANCE: Decimal = dec!(0.001);

/// How a ticker's positions disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MismatchKind {
    /// Broker holds it, ledger does not.
    BrokerOnly,
    /// Ledger holds it, broker does not.
    LedgerOnly,
    /// Both hold it in different quantities.
    QtyMismatch,
}

impl MismatchKind {
    /// Report label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BrokerOnly => "BROKER_ONLY",
            Self::LedgerOnly => "LEDGER_ONLY",
            Self::QtyMismatch => "QTY_MISMATCH",
        }
    }
}

/// One ticker that failed to reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Ticker symbol.
    pub ticker: String,
    /// Quantity the broker reports.
    pub broker_qty: Decimal,
    /// Quantity in open lots.
    pub ledger_qty: Decimal,
    /// `broker_qty - ledger_qty`.
    pub diff: Decimal,
    /// Classification.
    pub kind: MismatchKind,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// Run time.
    pub checked_at: DateTime<Utc>,
    /// Tickers compared.
    pub tickers_checked: usize,
    /// Disagreements, sorted by ticker.
    pub mismatches: Vec<Mismatch>,
}

impl ReconciliationResult {
    /// Whether both sides agree.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Plain-text report for operators.
    #[must_use]
    pub fn format_report(&self) -> String {
        if self.is_clean() {
            return format!(
                "Position sync OK: {} ticker(s) match",
                self.tickers_checked
            );
        }

        let mut out = format!(
            "Position sync: {} mismatch(es) across {} ticker(s)",
            self.mismatches.len(),
            self.tickers_checked
        );
        for m in &self.mismatches {
            let _ = write!(
                out,
                "\n{} {}: broker={} ledger={} diff={}",
                m.kind.as_str(),
                m.ticker,
                m.broker_qty.normalize(),
                m.ledger_qty.normalize(),
                m.diff.normalize()
            );
        }
        out
    }
}

/// Compare broker and ledger quantities.
///
/// Both inputs may repeat a ticker; quantities are summed per ticker
/// before comparing. Zero quantities count as "not held".
pub fn compare<B, L>(broker: B, ledger: L, checked_at: DateTime<Utc>) -> ReconciliationResult
where
    B: IntoIterator<Item = (String, Decimal)>,
    L: IntoIterator<Item = (String, Decimal)>,
{
    let mut broker_qty: BTreeMap<String, Decimal> = BTreeMap::new();
    for (ticker, qty) in broker {
        *broker_qty.entry(ticker).or_default() += qty;
    }
    let mut ledger_qty: BTreeMap<String, Decimal> = BTreeMap::new();
    for (ticker, qty) in ledger {
        *ledger_qty.entry(ticker).or_default() += qty;
    }

    let mut tickers: Vec<&String> = broker_qty.keys().chain(ledger_qty.keys()).collect();
    tickers.sort();
    tickers.dedup();

    let mut mismatches = Vec::new();
    for ticker in &tickers {
        let b = broker_qty.get(*ticker).copied().unwrap_or_default();
        let l = ledger_qty.get(*ticker).copied().unwrap_or_default();
        let diff = b - l;
        if diff.abs() <= QTY_TOLERANCE {
            continue;
        }
        let kind = if l.is_zero() {
            MismatchKind::BrokerOnly
        } else if b.is_zero() {
            MismatchKind::LedgerOnly
        } else {
            MismatchKind::QtyMismatch
        };
        mismatches.push(Mismatch {
            ticker: (*ticker).clone(),
            broker_qty: b,
            ledger_qty: l,
            diff,
            kind,
        });
    }

    ReconciliationResult {
        checked_at,
        tickers_checked: tickers.len(),
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(ticker: &str, qty: Decimal) -> (String, Decimal) {
        (ticker.to_string(), qty)
    }

    #[test]
    fn within_tolerance_is_clean() {
        let result = compare(
            vec![pos("AAPL", dec!(100))],
            vec![pos("AAPL", dec!(99.9995))],
            Utc::now(),
        );
        assert!(result.is_clean());
        assert_eq!(result.tickers_checked, 1);
        assert!(result.format_report().contains("OK"));
    }

    #[test]
    fn quantity_mismatch_diff_is_broker_minus_ledger() {
        let result = compare(
            vec![pos("AAPL", dec!(100))],
            vec![pos("AAPL", dec!(60)), pos("AAPL", dec!(39))],
            Utc::now(),
        );
        assert_eq!(result.mismatches.len(), 1);
        let m = &result.mismatches[0];
        assert_eq!(m.kind, MismatchKind::QtyMismatch);
        assert_eq!(m.ledger_qty, dec!(99));
        assert_eq!(m.diff, dec!(1));
    }

    #[test]
    fn one_sided_holdings_are_classified() {
        let result = compare(
            vec![pos("MSFT", dec!(3))],
            vec![pos("TSLA", dec!(2))],
            Utc::now(),
        );
        assert_eq!(result.mismatches.len(), 2);
        assert_eq!(result.mismatches[0].ticker, "MSFT");
        assert_eq!(result.mismatches[0].kind, MismatchKind::BrokerOnly);
        assert_eq!(result.mismatches[1].ticker, "TSLA");
        assert_eq!(result.mismatches[1].kind, MismatchKind::LedgerOnly);
        assert_eq!(result.mismatches[1].diff, dec!(-2));

        let report = result.format_report();
        assert!(report.contains("2 mismatch(es)"));
        assert!(report.contains("BROKER_ONLY MSFT: broker=3 ledger=0 diff=3"));
        assert!(report.contains("LEDGER_ONLY TSLA"));
    }

    #[test]
    fn empty_sides_are_clean() {
        let result = compare(Vec::new(), Vec::new(), Utc::now());
        assert!(result.is_clean());
        assert_eq!(result.tickers_checked, 0);
    }

    #[test]
    fn kind_serializes_screaming() {
        assert_eq!(
            serde_json::to_value(MismatchKind::QtyMismatch).unwrap(),
            "QTY_MISMATCH"
        );
    }
}
