//! Broker Gateway
//!
//! Owns the single broker session. Callers see account, position and
//! order primitives; reconnection happens behind them.
//!
//! # Session lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//!                                   |  connectivity error
//!                                   v
//!                   Reconnecting { attempt } --ok--> Connected
//!                                   |  attempts exhausted
//!                                   v
//!                                Failed  (until connect() is called again)
//! ```
//!
//! Calls made while the session is not `Connected` fail fast with
//! [`GatewayError::NotConnected`] so the worker can retry the order later.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::ReconnectPolicy;
use crate::application::ports::{
    BrokerError, BrokerOrderStatus, BrokerPort, BrokerPosition, Instrument, MarketOrderRequest,
};
use crate::domain::shared::{BrokerOrderId, IdempotencyKey, OrderSide, Ticker};
use crate::observability::{
    record_order_latency, record_reconnect_attempt, record_reconnect_exhausted,
    update_broker_connected,
};

/// Gateway timing and reconnect settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bounded wait for a price snapshot.
    pub snapshot_timeout: Duration,
    /// How long to wait for an order to finish before cancelling it.
    pub order_timeout: Duration,
    /// Interval between order status polls.
    pub fill_poll_interval: Duration,
    /// Reconnect delay unit; attempt `n` waits `n * base`.
    pub reconnect_base_delay: Duration,
    /// Reconnect delay cap.
    pub reconnect_max_delay: Duration,
    /// Attempts before the session is declared failed.
    pub max_reconnect_attempts: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            snapshot_timeout: Duration::from_secs(2),
            order_timeout: Duration::from_secs(30),
            fill_poll_interval: Duration::from_millis(500),
            reconnect_base_delay: Duration::from_secs(5),
            reconnect_max_delay: Duration::from_secs(300),
            max_reconnect_attempts: 50,
        }
    }
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session.
    Disconnected,
    /// Initial connect in progress.
    Connecting,
    /// Session up.
    Connected,
    /// Background reconnect in progress.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Reconnect budget exhausted; needs an explicit `connect()`.
    Failed,
}

impl ConnectionState {
    /// Whether orders can be sent.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Session events for operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// `connect()` succeeded.
    Connected,
    /// The session dropped.
    Disconnected {
        /// What was observed.
        reason: String,
    },
    /// A reconnect attempt is about to run.
    ReconnectAttempt {
        /// 1-based attempt number.
        attempt: u32,
        /// Attempt budget.
        max_attempts: u32,
        /// Wait before this attempt.
        delay: Duration,
    },
    /// The background reconnect succeeded.
    Reconnected {
        /// Attempts it took.
        attempts: u32,
    },
    /// Every attempt failed. Emitted once per outage.
    ReconnectExhausted {
        /// Attempts made.
        attempts: u32,
    },
}

/// Outcome of a market order after polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FillResult {
    /// Broker order id.
    pub broker_order_id: BrokerOrderId,
    /// Final status seen.
    pub status: BrokerOrderStatus,
    /// Quantity asked for.
    pub requested_qty: Decimal,
    /// Quantity filled.
    pub filled_qty: Decimal,
    /// Average fill price.
    pub avg_price: Option<Decimal>,
    /// Commission charged.
    pub commission: Decimal,
    /// True only when the broker reports `filled`.
    pub fully_filled: bool,
    /// The order was cancelled for exceeding the fill timeout.
    pub timed_out: bool,
}

impl FillResult {
    /// Fill price when some quantity filled at a positive price.
    #[must_use]
    pub fn fill_price(&self) -> Option<Decimal> {
        if self.filled_qty <= Decimal::ZERO {
            return None;
        }
        self.avg_price.filter(|p| *p > Decimal::ZERO)
    }
}

/// Gateway errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The session is down; nothing was sent.
    #[error("Broker not connected")]
    NotConnected,

    /// The session dropped during the call.
    #[error("Broker connectivity lost: {0}")]
    Connectivity(String),

    /// No tradable instrument for the ticker.
    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    /// The broker refused the order.
    #[error("Order rejected: {0}")]
    Rejected(String),

    /// Any other broker failure.
    #[error(transparent)]
    Broker(BrokerError),
}

impl GatewayError {
    /// Whether the failure was the session rather than the request.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Connectivity(_))
    }
}

impl From<BrokerError> for GatewayError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::ConnectionError { message } => Self::Connectivity(message),
            BrokerError::ContractNotFound { ticker } => Self::ContractNotFound(ticker),
            BrokerError::OrderRejected { reason } => Self::Rejected(reason),
            err @ BrokerError::InsufficientFunds => Self::Rejected(err.to_string()),
            other => Self::Broker(other),
        }
    }
}

/// The broker session.
pub struct BrokerGateway<B: BrokerPort> {
    inner: Arc<GatewayInner<B>>,
}

impl<B: BrokerPort> Clone for BrokerGateway<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct GatewayInner<B: BrokerPort> {
    broker: Arc<B>,
    config: GatewayConfig,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<GatewayEvent>,
    reconnecting: AtomicBool,
}

impl<B: BrokerPort + 'static> BrokerGateway<B> {
    /// Create a disconnected gateway.
    pub fn new(broker: Arc<B>, config: GatewayConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(GatewayInner {
                broker,
                config,
                state,
                events,
                reconnecting: AtomicBool::new(false),
            }),
        }
    }

    /// Current session state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Whether the session is up.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Watch session state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.events.subscribe()
    }

    /// Establish the session. Also clears a `Failed` state.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        self.inner.set_state(ConnectionState::Connecting);
        match self.inner.broker.connect().await {
            Ok(()) => {
                self.inner.set_state(ConnectionState::Connected);
                self.inner.emit(GatewayEvent::Connected);
                info!("Broker session connected");
                Ok(())
            }
            Err(e) => {
                self.inner.set_state(ConnectionState::Disconnected);
                warn!(error = %e, "Broker connect failed");
                Err(e.into())
            }
        }
    }

    /// Fail fast unless the session is up.
    pub fn ensure_connected(&self) -> Result<(), GatewayError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(GatewayError::NotConnected)
        }
    }

    /// React to a lost session by starting the background reconnect.
    ///
    /// No-op while a reconnect is already running or after the budget
    /// ran out.
    pub fn handle_disconnect(&self, reason: &str) {
        if self.state() == ConnectionState::Failed {
            debug!(reason, "Ignoring disconnect; session needs manual reconnect");
            return;
        }
        if self.inner.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.set_state(ConnectionState::Disconnected);
        warn!(reason, "Broker session lost");
        self.inner.emit(GatewayEvent::Disconnected {
            reason: reason.to_string(),
        });

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.auto_reconnect().await;
        });
    }

    /// Resolve a ticker to a tradable instrument.
    pub async fn qualify(&self, ticker: &Ticker) -> Result<Instrument, GatewayError> {
        self.ensure_connected()?;
        self.inner
            .broker
            .qualify(ticker)
            .await
            .map_err(|e| self.classify(e))
    }

    /// Last price, else prior close, within the snapshot timeout.
    ///
    /// `Ok(None)` when neither is available in time.
    pub async fn snapshot_price(
        &self,
        instrument: &Instrument,
    ) -> Result<Option<Decimal>, GatewayError> {
        self.ensure_connected()?;
        match tokio::time::timeout(
            self.inner.config.snapshot_timeout,
            self.inner.broker.snapshot(instrument),
        )
        .await
        {
            Ok(Ok(snapshot)) => Ok(snapshot.usable_price()),
            Ok(Err(e)) => Err(self.classify(e)),
            Err(_) => {
                warn!(ticker = %instrument.ticker, "Price snapshot timed out");
                Ok(None)
            }
        }
    }

    /// Submit a day market order and wait for it to finish.
    ///
    /// Polls every `fill_poll_interval` up to `order_timeout`. An order
    /// still working at the deadline is cancelled and its final state
    /// fetched, so a partial fill is still reported.
    pub async fn place_market_order(
        &self,
        instrument: &Instrument,
        side: OrderSide,
        quantity: Decimal,
        client_order_id: &IdempotencyKey,
    ) -> Result<FillResult, GatewayError> {
        self.ensure_connected()?;

        let started = Instant::now();
        let request =
            MarketOrderRequest::new(client_order_id.clone(), instrument.clone(), side, quantity);
        let mut ack = self
            .inner
            .broker
            .submit_market_order(request)
            .await
            .map_err(|e| self.classify(e))?;

        info!(
            broker_order_id = %ack.broker_order_id,
            ticker = %instrument.ticker,
            side = %side,
            %quantity,
            "Market order submitted"
        );

        let deadline = started + self.inner.config.order_timeout;
        let mut timed_out = false;

        while !ack.status.is_done() {
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }
            tokio::time::sleep(self.inner.config.fill_poll_interval).await;
            match self.inner.broker.get_order(&ack.broker_order_id).await {
                Ok(latest) => ack = latest,
                Err(e) => {
                    warn!(broker_order_id = %ack.broker_order_id, error = %e, "Order status poll failed");
                    if e.is_connectivity() {
                        self.handle_disconnect(&e.to_string());
                    }
                }
            }
        }

        if timed_out {
            warn!(
                broker_order_id = %ack.broker_order_id,
                status = ?ack.status,
                filled = %ack.filled_qty,
                "Order not done before timeout, cancelling"
            );
            if let Err(e) = self.inner.broker.cancel_order(&ack.broker_order_id).await {
                warn!(broker_order_id = %ack.broker_order_id, error = %e, "Cancel failed");
            }
            match self.inner.broker.get_order(&ack.broker_order_id).await {
                Ok(latest) => ack = latest,
                Err(e) => {
                    warn!(broker_order_id = %ack.broker_order_id, error = %e, "Final status fetch failed");
                }
            }
        }

        record_order_latency(side.label(), started.elapsed().as_secs_f64());

        Ok(FillResult {
            broker_order_id: ack.broker_order_id,
            fully_filled: ack.status == BrokerOrderStatus::Filled,
            status: ack.status,
            requested_qty: quantity,
            filled_qty: ack.filled_qty,
            avg_price: ack.avg_fill_price,
            commission: ack.commission,
            timed_out,
        })
    }

    /// Cash available for new positions.
    pub async fn available_cash(&self) -> Result<Decimal, GatewayError> {
        self.ensure_connected()?;
        self.inner
            .broker
            .available_cash()
            .await
            .map_err(|e| self.classify(e))
    }

    /// Positions as the broker reports them.
    pub async fn positions(&self) -> Result<Vec<BrokerPosition>, GatewayError> {
        self.ensure_connected()?;
        self.inner
            .broker
            .positions()
            .await
            .map_err(|e| self.classify(e))
    }

    fn classify(&self, err: BrokerError) -> GatewayError {
        if err.is_connectivity() {
            self.handle_disconnect(&err.to_string());
        }
        err.into()
    }
}

impl<B: BrokerPort> GatewayInner<B> {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
        update_broker_connected(state.is_connected());
    }

    fn emit(&self, event: GatewayEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn auto_reconnect(&self) {
        let mut policy = ReconnectPolicy::new(
            self.config.reconnect_base_delay,
            self.config.reconnect_max_delay,
            self.config.max_reconnect_attempts,
        );

        while let Some(delay) = policy.next_delay() {
            let attempt = policy.current_attempt();
            self.set_state(ConnectionState::Reconnecting { attempt });
            self.emit(GatewayEvent::ReconnectAttempt {
                attempt,
                max_attempts: policy.max_attempts(),
                delay,
            });
            record_reconnect_attempt();
            info!(
                attempt,
                max_attempts = policy.max_attempts(),
                delay_secs = delay.as_secs(),
                "Reconnecting to broker"
            );

            tokio::time::sleep(delay).await;

            match self.broker.connect().await {
                Ok(()) => {
                    self.set_state(ConnectionState::Connected);
                    self.emit(GatewayEvent::Reconnected { attempts: attempt });
                    self.reconnecting.store(false, Ordering::SeqCst);
                    info!(attempts = attempt, "Broker session restored");
                    return;
                }
                Err(e) => warn!(attempt, error = %e, "Reconnect attempt failed"),
            }
        }

        let attempts = policy.current_attempt();
        self.set_state(ConnectionState::Failed);
        record_reconnect_exhausted();
        error!(
            attempts,
            severity = "critical",
            "Broker reconnect attempts exhausted; manual intervention required"
        );
        self.emit(GatewayEvent::ReconnectExhausted { attempts });
        self.reconnecting.store(false, Ordering::SeqCst);
    }
}
