//! Intake Store Port (Driven Port)

use async_trait::async_trait;

use super::PersistenceError;
use crate::domain::order_queue::QueuedOrder;
use crate::domain::signal::Signal;

/// Outcome of an intake insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeInsert {
    /// Audit row written and order enqueued.
    Inserted {
        /// Queue seq of the new order.
        seq: i64,
    },
    /// The idempotency key already exists; nothing was written.
    Duplicate,
}

/// Port for the signal audit table.
///
/// The audit insert and the enqueue happen in one transaction guarded by
/// the unique idempotency key.
#[async_trait]
pub trait IntakeStorePort: Send + Sync {
    /// Record the signal and enqueue its order, unless the key is known.
    async fn record_and_enqueue(
        &self,
        signal: &Signal,
        order: &QueuedOrder,
    ) -> Result<IntakeInsert, PersistenceError>;
}
