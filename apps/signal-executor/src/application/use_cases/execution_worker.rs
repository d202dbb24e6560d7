//! Execution Worker
//!
//! The single consumer of the order queue. Orders are processed one at a
//! time so that every risk check sees the effect of the order before it.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::process_order::ProcessOrderUseCase;
use crate::application::ports::{
    BrokerPort, LedgerPort, NotifierPort, OrderQueuePort, SettingsPort, notify_best_effort,
};
use crate::application::services::{BrokerGateway, PollBackoff};
use crate::observability::update_queue_depth;

/// Worker pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// First sleep after an empty dequeue.
    pub poll_min: Duration,
    /// Longest sleep between empty dequeues.
    pub poll_max: Duration,
    /// Sleep after a queue error or a deferred order.
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_min: Duration::from_millis(100),
            poll_max: Duration::from_secs(2),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Dequeue loop around [`ProcessOrderUseCase`].
pub struct ExecutionWorker<B, L, Q, S>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
{
    engine: Arc<ProcessOrderUseCase<B, L, Q, S>>,
    queue: Arc<Q>,
    gateway: BrokerGateway<B>,
    notifier: Arc<dyn NotifierPort>,
    config: WorkerConfig,
}

impl<B, L, Q, S> ExecutionWorker<B, L, Q, S>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
{
    /// Create a worker.
    pub fn new(
        engine: Arc<ProcessOrderUseCase<B, L, Q, S>>,
        queue: Arc<Q>,
        gateway: BrokerGateway<B>,
        notifier: Arc<dyn NotifierPort>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            engine,
            queue,
            gateway,
            notifier,
            config,
        }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// The order in flight when shutdown is requested is finished first.
    pub async fn run(&self, shutdown: CancellationToken) {
        let text = if self.gateway.is_connected() {
            "Order worker started, broker connected"
        } else {
            "Order worker started, broker not connected"
        };
        info!(connected = self.gateway.is_connected(), "Order worker started");
        notify_best_effort(self.notifier.as_ref(), text).await;

        let mut backoff = PollBackoff::new(self.config.poll_min, self.config.poll_max);
        while !shutdown.is_cancelled() {
            let Some(delay) = self.step(&mut backoff).await else {
                continue;
            };
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        info!("Order worker stopped");
    }

    /// Process at most one order. Returns how long to sleep before the
    /// next dequeue, if at all.
    pub async fn step(&self, backoff: &mut PollBackoff) -> Option<Duration> {
        match self.queue.dequeue().await {
            Ok(Some(order)) => {
                backoff.reset();
                let outcome = self.engine.execute(&order).await;
                if let Ok(stats) = self.queue.stats().await {
                    update_queue_depth(&stats);
                }
                outcome
                    .is_deferred()
                    .then_some(self.config.error_backoff)
            }
            Ok(None) => {
                let delay = backoff.on_empty();
                debug!(delay_ms = delay.as_millis(), "Queue empty");
                Some(delay)
            }
            Err(e) => {
                error!(error = %e, "Dequeue failed");
                Some(self.config.error_backoff)
            }
        }
    }
}
