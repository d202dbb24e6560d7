//! Application Use Cases
//!
//! Use cases orchestrate domain logic to fulfill application requirements.

mod control;
mod execution_worker;
mod flush_pending;
mod intake_signal;
mod process_order;
mod reconcile;
mod session_alerts;
mod status;

pub use control::{ControlCommand, ControlError, ControlUseCase};
pub use execution_worker::{ExecutionWorker, WorkerConfig};
pub use flush_pending::{FlushPendingUseCase, MARKET_WATCH_INTERVAL, MarketOpenWatcher};
pub use intake_signal::{IntakeError, IntakeOutcome, IntakeSignalUseCase};
pub use process_order::{
    BuyReport, ExecutionConfig, ProcessOrderDeps, ProcessOrderUseCase, ProcessOutcome, SellReport,
};
pub use reconcile::{ReconcileError, ReconcileUseCase, ReconciliationTask};
pub use session_alerts::{alert_text, forward_session_alerts};
pub use status::{MarketStatus, RiskSummary, StatusReport, StatusUseCase};
