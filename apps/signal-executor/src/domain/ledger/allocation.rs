//! Allocation of a SELL fill across the open lots of one ticker.
//!
//! A full fill closes every lot at the same exit price. A partial fill
//! closes lots oldest-first; the lot straddling the filled quantity is
//! split so that the sold part closes and the rest stays open with its
//! entry amount reduced pro rata.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::lot::PositionLot;
use crate::domain::shared::LotId;

/// Decimal places kept when pro-rating an entry amount.
const PRO_RATA_DP: u32 = 8;

/// Decimal places kept on pnl percentages.
const PNL_PCT_DP: u32 = 4;

/// How one open lot is closed by a SELL fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotClose {
    /// Lot being closed (or split).
    pub lot_id: LotId,
    /// Quantity the lot held before the sell.
    pub lot_qty: Decimal,
    /// Quantity closed.
    pub close_qty: Decimal,
    /// Entry price of the lot.
    pub entry_price: Decimal,
    /// Entry amount attributed to the closed quantity.
    pub entry_amount: Decimal,
    /// `close_qty * exit_price`.
    pub exit_amount: Decimal,
    /// `exit_amount - entry_amount`.
    pub pnl: Decimal,
    /// `pnl / entry_amount * 100`.
    pub pnl_pct: Decimal,
    /// Quantity left open; zero unless split.
    pub remaining_qty: Decimal,
    /// Entry amount left on the open remainder.
    pub remaining_entry_amount: Decimal,
}

impl LotClose {
    /// Whether only part of the lot was sold.
    #[must_use]
    pub fn is_split(&self) -> bool {
        self.remaining_qty > Decimal::ZERO
    }
}

/// Result of allocating a SELL fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellAllocation {
    /// Per-lot closes, oldest lot first.
    pub closes: Vec<LotClose>,
    /// Exit price applied to every lot.
    pub exit_price: Decimal,
    /// Quantity allocated.
    pub total_qty: Decimal,
    /// Summed entry amounts of the closed quantity.
    pub total_entry: Decimal,
    /// Summed exit amounts.
    pub total_exit: Decimal,
    /// Summed pnl.
    pub total_pnl: Decimal,
    /// `total_pnl / total_entry * 100`.
    pub pnl_pct: Decimal,
}

impl SellAllocation {
    /// Number of lots touched.
    #[must_use]
    pub fn lots_closed(&self) -> usize {
        self.closes.len()
    }
}

/// Allocate `filled_qty` at `fill_price` across `open_lots`.
///
/// Quantity beyond the lots' total is ignored.
#[must_use]
pub fn allocate_sell(
    open_lots: &[PositionLot],
    filled_qty: Decimal,
    fill_price: Decimal,
) -> SellAllocation {
    let mut lots: Vec<&PositionLot> = open_lots
        .iter()
        .filter(|lot| lot.is_open() && lot.qty > Decimal::ZERO)
        .collect();
    lots.sort_by(|a, b| a.entry_time.cmp(&b.entry_time).then(a.id.cmp(&b.id)));

    let mut left = filled_qty.max(Decimal::ZERO);
    let mut closes = Vec::with_capacity(lots.len());

    for lot in lots {
        if left <= Decimal::ZERO {
            break;
        }

        let close_qty = left.min(lot.qty);
        left -= close_qty;

        let (entry_amount, remaining_qty, remaining_entry_amount) = if close_qty == lot.qty {
            (lot.entry_amount, Decimal::ZERO, Decimal::ZERO)
        } else {
            let closed = (lot.entry_amount * close_qty / lot.qty).round_dp(PRO_RATA_DP);
            (closed, lot.qty - close_qty, lot.entry_amount - closed)
        };

        let exit_amount = close_qty * fill_price;
        let pnl = exit_amount - entry_amount;

        closes.push(LotClose {
            lot_id: lot.id,
            lot_qty: lot.qty,
            close_qty,
            entry_price: lot.entry_price,
            entry_amount,
            exit_amount,
            pnl,
            pnl_pct: pnl_pct(pnl, entry_amount),
            remaining_qty,
            remaining_entry_amount,
        });
    }

    let total_qty = closes.iter().map(|c| c.close_qty).sum();
    let total_entry: Decimal = closes.iter().map(|c| c.entry_amount).sum();
    let total_exit: Decimal = closes.iter().map(|c| c.exit_amount).sum();
    let total_pnl = total_exit - total_entry;

    SellAllocation {
        closes,
        exit_price: fill_price,
        total_qty,
        total_entry,
        total_exit,
        total_pnl,
        pnl_pct: pnl_pct(total_pnl, total_entry),
    }
}

fn pnl_pct(pnl: Decimal, entry_amount: Decimal) -> Decimal {
    if entry_amount.is_zero() {
        return Decimal::ZERO;
    }
    (pnl / entry_amount * Decimal::ONE_HUNDRED).round_dp(PNL_PCT_DP)
}
