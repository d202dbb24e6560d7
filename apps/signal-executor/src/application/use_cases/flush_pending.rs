//! Flush Pending Use Case
//!
//! Moves orders parked outside market hours back into the active lanes.
//! [`MarketOpenWatcher`] runs it once per closed-to-open transition.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::application::ports::{
    Clock, NotifierPort, OrderQueuePort, PersistenceError, notify_best_effort,
};
use crate::domain::market_hours::MarketCalendar;
use crate::observability::record_pending_flush;

/// How often the watcher samples the session.
pub const MARKET_WATCH_INTERVAL: Duration = Duration::from_secs(30);

/// Use case for releasing the pending lane.
pub struct FlushPendingUseCase<Q>
where
    Q: OrderQueuePort,
{
    queue: Arc<Q>,
    notifier: Arc<dyn NotifierPort>,
}

impl<Q> FlushPendingUseCase<Q>
where
    Q: OrderQueuePort,
{
    /// Create a new FlushPendingUseCase.
    pub fn new(queue: Arc<Q>, notifier: Arc<dyn NotifierPort>) -> Self {
        Self { queue, notifier }
    }

    /// Move every pending order to its lane. Returns the count moved.
    ///
    /// # Errors
    ///
    /// Returns the queue's error; nothing moves in that case.
    pub async fn execute(&self) -> Result<u64, PersistenceError> {
        let moved = self.queue.flush_pending().await?;
        record_pending_flush(moved);
        if moved > 0 {
            info!(moved, "Pending orders released");
            notify_best_effort(
                self.notifier.as_ref(),
                &format!("Market open: {moved} pending order(s) released"),
            )
            .await;
        }
        Ok(moved)
    }
}

/// Samples the session and flushes on every closed-to-open transition.
pub struct MarketOpenWatcher<Q>
where
    Q: OrderQueuePort,
{
    flush: FlushPendingUseCase<Q>,
    calendar: Arc<MarketCalendar>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl<Q> MarketOpenWatcher<Q>
where
    Q: OrderQueuePort,
{
    /// Create a watcher sampling every [`MARKET_WATCH_INTERVAL`].
    pub fn new(
        flush: FlushPendingUseCase<Q>,
        calendar: Arc<MarketCalendar>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            flush,
            calendar,
            clock,
            interval: MARKET_WATCH_INTERVAL,
        }
    }

    /// Override the sampling interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Take one sample. `was_open` is the previous sample, `None` at
    /// startup; startup during the session counts as a transition.
    ///
    /// Returns the new sample. A failed flush keeps the previous sample so
    /// the next tick retries.
    pub async fn observe(&self, was_open: Option<bool>) -> Option<bool> {
        let open = self.calendar.is_open(self.clock.now());
        if open && was_open != Some(true) {
            if let Err(e) = self.flush.execute().await {
                error!(error = %e, "Pending flush failed");
                return was_open;
            }
        }
        Some(open)
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        let mut was_open = None;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    was_open = self.observe(was_open).await;
                }
            }
        }
    }
}
