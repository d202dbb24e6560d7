//! Intake Signal Use Case
//!
//! Validates an inbound signal, writes its audit row, and enqueues its
//! order. The audit insert is guarded by the unique idempotency key, so
//! two near-simultaneous deliveries of the same alert enqueue once.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::application::ports::{Clock, IntakeInsert, IntakeStorePort, PersistenceError};
use crate::domain::order_queue::{Lane, QueuedOrder};
use crate::domain::shared::IdempotencyKey;
use crate::domain::signal::{Signal, SignalError, SignalRequest};
use crate::observability::record_signal;

/// Result of accepting a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// New signal; its order is queued.
    Queued {
        /// Canonical idempotency key.
        key: IdempotencyKey,
        /// Lane the order went to.
        lane: Lane,
        /// Queue position.
        seq: i64,
    },
    /// The key was seen before; nothing was queued.
    Duplicate {
        /// Canonical idempotency key.
        key: IdempotencyKey,
    },
}

impl IntakeOutcome {
    /// The canonical key either way.
    #[must_use]
    pub const fn key(&self) -> &IdempotencyKey {
        match self {
            Self::Queued { key, .. } | Self::Duplicate { key } => key,
        }
    }
}

/// Intake failures.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    /// The signal is malformed.
    #[error(transparent)]
    Validation(#[from] SignalError),

    /// The audit store is unavailable.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Use case for accepting signals.
pub struct IntakeSignalUseCase<S>
where
    S: IntakeStorePort,
{
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> IntakeSignalUseCase<S>
where
    S: IntakeStorePort,
{
    /// Create a new IntakeSignalUseCase.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Validate, deduplicate, record, and enqueue.
    ///
    /// # Errors
    ///
    /// `Validation` for a bad action, ticker, or key; `Persistence` when the
    /// audit store fails.
    pub async fn execute(&self, request: &SignalRequest) -> Result<IntakeOutcome, IntakeError> {
        let signal = match Signal::from_request(request, self.clock.now()) {
            Ok(signal) => signal,
            Err(e) => {
                warn!(action = %request.action, ticker = %request.ticker, error = %e, "Signal rejected");
                record_signal("rejected");
                return Err(e.into());
            }
        };

        let order = QueuedOrder::from_signal(&signal);
        let key = signal.idempotency_key.clone();

        match self.store.record_and_enqueue(&signal, &order).await? {
            IntakeInsert::Inserted { seq } => {
                let lane = order.active_lane();
                info!(
                    action = %signal.action,
                    ticker = %signal.ticker,
                    idempotency_key = %key,
                    lane = lane.as_str(),
                    seq,
                    "Signal queued"
                );
                record_signal("queued");
                Ok(IntakeOutcome::Queued { key, lane, seq })
            }
            IntakeInsert::Duplicate => {
                debug!(idempotency_key = %key, "Duplicate signal ignored");
                record_signal("duplicate");
                Ok(IntakeOutcome::Duplicate { key })
            }
        }
    }
}
