//! Order Queue Port (Driven Port)
//!
//! Durable three-lane queue. `dequeue` never blocks; callers poll.

use async_trait::async_trait;

use super::PersistenceError;
use crate::domain::order_queue::{QueueStats, QueuedOrder};

/// Port for the order queue.
#[async_trait]
pub trait OrderQueuePort: Send + Sync {
    /// Append to the sell or buy lane by action. Returns the assigned seq.
    async fn enqueue(&self, order: &QueuedOrder) -> Result<i64, PersistenceError>;

    /// Pop the oldest sell order, else the oldest buy order.
    async fn dequeue(&self) -> Result<Option<QueuedOrder>, PersistenceError>;

    /// Append to the pending lane with a reason.
    async fn park_pending(
        &self,
        order: &QueuedOrder,
        reason: &str,
    ) -> Result<(), PersistenceError>;

    /// Put a dequeued order back in its active lane at its original position.
    async fn requeue(&self, order: &QueuedOrder) -> Result<(), PersistenceError>;

    /// Move every pending order to its active lane. Returns the count moved.
    async fn flush_pending(&self) -> Result<u64, PersistenceError>;

    /// Lane sizes.
    async fn stats(&self) -> Result<QueueStats, PersistenceError>;

    /// Empty every lane. Returns the count removed.
    async fn clear_all(&self) -> Result<u64, PersistenceError>;
}
