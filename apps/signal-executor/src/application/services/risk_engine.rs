//! Risk Engine
//!
//! Ordered, short-circuiting chain of [`RiskCheck`]s. BUY orders run the
//! full chain; SELL orders only the kill switch so positions can always
//! be reduced.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use super::BrokerGateway;
use super::risk_checks::{
    CashBalanceCheck, DailyBuysCheck, DailyLossCheck, KillSwitchCheck, OpenPositionsCheck,
    PauseCheck, PerTickerCheck, RiskCheck, RiskContext, TotalInvestmentCheck,
};
use crate::application::ports::{BrokerPort, LedgerPort};
use crate::domain::risk_management::{CheckOutcome, RiskSettings, RiskVerdict};
use crate::domain::shared::{OrderSide, Ticker};

/// Runs the buy and sell check chains.
pub struct RiskEngine {
    buy_checks: Vec<Box<dyn RiskCheck>>,
    sell_checks: Vec<Box<dyn RiskCheck>>,
}

impl RiskEngine {
    /// Build an engine from explicit chains.
    #[must_use]
    pub fn new(buy_checks: Vec<Box<dyn RiskCheck>>, sell_checks: Vec<Box<dyn RiskCheck>>) -> Self {
        Self {
            buy_checks,
            sell_checks,
        }
    }

    /// The production chain.
    ///
    /// BUY: kill switch, pause, cash balance, total investment, open
    /// positions, per ticker, daily buys, daily loss. SELL: kill switch.
    pub fn standard<B, L>(gateway: BrokerGateway<B>, ledger: Arc<L>) -> Self
    where
        B: BrokerPort + 'static,
        L: LedgerPort + 'static,
    {
        Self::new(
            vec![
                Box::new(KillSwitchCheck),
                Box::new(PauseCheck),
                Box::new(CashBalanceCheck::new(gateway)),
                Box::new(TotalInvestmentCheck::new(Arc::clone(&ledger))),
                Box::new(OpenPositionsCheck::new(Arc::clone(&ledger))),
                Box::new(PerTickerCheck::new(Arc::clone(&ledger))),
                Box::new(DailyBuysCheck::new(Arc::clone(&ledger))),
                Box::new(DailyLossCheck::new(ledger)),
            ],
            vec![Box::new(KillSwitchCheck)],
        )
    }

    /// Names of the checks for `side`, in order.
    #[must_use]
    pub fn check_names(&self, side: OrderSide) -> Vec<&'static str> {
        self.chain(side).iter().map(|c| c.name()).collect()
    }

    /// Evaluate the chain for one order, stopping at the first failure.
    pub async fn evaluate(
        &self,
        side: OrderSide,
        ticker: &Ticker,
        settings: &RiskSettings,
        now: DateTime<Utc>,
    ) -> RiskVerdict {
        let ctx = RiskContext {
            side,
            ticker,
            settings,
            now,
        };

        for check in self.chain(side) {
            let name = check.name();
            match check.evaluate(&ctx).await {
                Ok(CheckOutcome::Pass) => debug!(check = name, %ticker, "Risk check passed"),
                Ok(CheckOutcome::Fail(reason)) => {
                    warn!(check = name, %ticker, %reason, "Risk check failed");
                    return RiskVerdict::Rejected {
                        check: name.to_string(),
                        reason,
                    };
                }
                Err(e) => {
                    error!(check = name, %ticker, error = %e, "Risk check error");
                    return RiskVerdict::Errored {
                        check: name.to_string(),
                        reason: format!("Risk check error ({name}): {e}"),
                        retryable: e.is_connectivity(),
                    };
                }
            }
        }

        RiskVerdict::Approved
    }

    fn chain(&self, side: OrderSide) -> &[Box<dyn RiskCheck>] {
        match side {
            OrderSide::Buy => &self.buy_checks,
            OrderSide::Sell => &self.sell_checks,
        }
    }
}
