//! Dependency Injection Container
//!
//! Builds every adapter once from [`Config`] and hands out the wired use
//! cases and background tasks.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::application::ports::{
    BrokerPort, Clock, NotifierPort, NotifyError, PersistenceError, SystemClock,
};
use crate::application::services::{BrokerGateway, RateLimiter, RiskEngine};
use crate::application::use_cases::{
    ControlUseCase, ExecutionWorker, FlushPendingUseCase, IntakeSignalUseCase, MarketOpenWatcher,
    ProcessOrderDeps, ProcessOrderUseCase, ReconcileUseCase, ReconciliationTask, StatusUseCase,
};
use crate::config::{Config, ConfigError};
use crate::domain::market_hours::MarketCalendar;
use crate::infrastructure::broker::{AlpacaBrokerAdapter, AlpacaError};
use crate::infrastructure::http::AppState;
use crate::infrastructure::notifications::{LogNotifier, TelegramNotifier};
use crate::infrastructure::persistence::{
    SqliteIntakeStore, SqliteLedger, SqliteOrderQueue, SqliteSettings, connect_pool,
};

/// HTTP state over the SQLite stores.
pub type SqliteAppState<B> =
    AppState<B, SqliteLedger, SqliteOrderQueue, SqliteSettings, SqliteIntakeStore>;

/// Worker over the SQLite stores.
pub type SqliteExecutionWorker<B> =
    ExecutionWorker<B, SqliteLedger, SqliteOrderQueue, SqliteSettings>;

/// Failures while wiring the application.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// A config section could not be turned into a component.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The database could not be opened or seeded.
    #[error("persistence: {0}")]
    Persistence(#[from] PersistenceError),
    /// The broker adapter could not be built.
    #[error("broker: {0}")]
    Broker(#[from] AlpacaError),
    /// The notifier could not be built.
    #[error("notifier: {0}")]
    Notifier(#[from] NotifyError),
}

/// Dependency injection container.
///
/// Holds one instance of every adapter. Use [`Container::from_config`] for
/// the production wiring or [`Container::with_broker`] to supply a broker.
pub struct Container<B>
where
    B: BrokerPort + 'static,
{
    config: Config,
    gateway: BrokerGateway<B>,
    ledger: Arc<SqliteLedger>,
    queue: Arc<SqliteOrderQueue>,
    settings: Arc<SqliteSettings>,
    intake_store: Arc<SqliteIntakeStore>,
    calendar: Arc<MarketCalendar>,
    notifier: Arc<dyn NotifierPort>,
    clock: Arc<dyn Clock>,
    reconcile: Arc<ReconcileUseCase<B, SqliteLedger>>,
}

impl Container<AlpacaBrokerAdapter> {
    /// Wire the Alpaca adapter and the configured database.
    ///
    /// # Errors
    ///
    /// Fails when any component cannot be built from `config`.
    pub async fn from_config(config: Config) -> Result<Self, ContainerError> {
        let broker = AlpacaBrokerAdapter::new(&config.broker.alpaca_config()?)?;
        let pool = connect_pool(
            &config.persistence.database_url,
            config.persistence.max_connections,
        )
        .await?;
        let notifier = build_notifier(&config)?;
        Self::with_broker(config, Arc::new(broker), pool, notifier).await
    }
}

impl<B> Container<B>
where
    B: BrokerPort + 'static,
{
    /// Wire `broker` against the stores on `pool`.
    ///
    /// Seeds the settings row from `risk_defaults` on first start.
    ///
    /// # Errors
    ///
    /// Fails when the calendar is invalid or the seed write fails.
    pub async fn with_broker(
        config: Config,
        broker: Arc<B>,
        pool: sqlx::SqlitePool,
        notifier: Arc<dyn NotifierPort>,
    ) -> Result<Self, ContainerError> {
        let calendar = Arc::new(config.market.calendar()?);
        let gateway = BrokerGateway::new(broker, config.broker.gateway_config());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let ledger = Arc::new(SqliteLedger::new(pool.clone()));
        let queue = Arc::new(SqliteOrderQueue::new(pool.clone()));
        let intake_store = Arc::new(SqliteIntakeStore::new(pool.clone()));
        let settings = Arc::new(SqliteSettings::new(pool));
        settings.seed(&config.risk_defaults).await?;

        let reconcile = Arc::new(ReconcileUseCase::new(
            gateway.clone(),
            Arc::clone(&ledger),
            Arc::clone(&clock),
        ));

        info!(
            environment = %config.broker.environment,
            timezone = %config.market.timezone,
            "Container wired"
        );

        Ok(Self {
            config,
            gateway,
            ledger,
            queue,
            settings,
            intake_store,
            calendar,
            notifier,
            clock,
            reconcile,
        })
    }

    /// Loaded configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The broker session.
    pub fn gateway(&self) -> BrokerGateway<B> {
        self.gateway.clone()
    }

    /// Operator channel.
    pub fn notifier(&self) -> Arc<dyn NotifierPort> {
        Arc::clone(&self.notifier)
    }

    /// Order queue.
    pub fn queue(&self) -> Arc<SqliteOrderQueue> {
        Arc::clone(&self.queue)
    }

    /// Position ledger.
    pub fn ledger(&self) -> Arc<SqliteLedger> {
        Arc::clone(&self.ledger)
    }

    /// Settings store.
    pub fn settings(&self) -> Arc<SqliteSettings> {
        Arc::clone(&self.settings)
    }

    /// Create the `ProcessOrderUseCase`.
    pub fn process_order_use_case(
        &self,
    ) -> ProcessOrderUseCase<B, SqliteLedger, SqliteOrderQueue, SqliteSettings> {
        let deps = ProcessOrderDeps {
            gateway: self.gateway.clone(),
            risk: Arc::new(RiskEngine::standard(
                self.gateway.clone(),
                Arc::clone(&self.ledger),
            )),
            ledger: Arc::clone(&self.ledger),
            queue: Arc::clone(&self.queue),
            settings: Arc::clone(&self.settings),
            calendar: Arc::clone(&self.calendar),
            rate_limiter: Arc::new(RateLimiter::per_second(
                self.config.execution.max_orders_per_second,
            )),
            notifier: Arc::clone(&self.notifier),
            clock: Arc::clone(&self.clock),
        };
        ProcessOrderUseCase::new(deps, self.config.execution.execution_config())
    }

    /// Create the queue consumer.
    pub fn execution_worker(&self) -> SqliteExecutionWorker<B> {
        ExecutionWorker::new(
            Arc::new(self.process_order_use_case()),
            Arc::clone(&self.queue),
            self.gateway.clone(),
            Arc::clone(&self.notifier),
            self.config.execution.worker_config(),
        )
    }

    /// Create the market-open watcher that releases parked orders.
    pub fn market_open_watcher(&self) -> MarketOpenWatcher<SqliteOrderQueue> {
        MarketOpenWatcher::new(
            FlushPendingUseCase::new(Arc::clone(&self.queue), Arc::clone(&self.notifier)),
            Arc::clone(&self.calendar),
            Arc::clone(&self.clock),
        )
    }

    /// Create the periodic reconciliation task.
    pub fn reconciliation_task(&self) -> ReconciliationTask<B, SqliteLedger> {
        ReconciliationTask::new(
            Arc::clone(&self.reconcile),
            Arc::clone(&self.calendar),
            Arc::clone(&self.notifier),
            self.config.reconciliation.interval(),
        )
    }

    /// Create the HTTP state.
    pub fn app_state(&self) -> SqliteAppState<B> {
        AppState {
            intake: Arc::new(IntakeSignalUseCase::new(
                Arc::clone(&self.intake_store),
                Arc::clone(&self.clock),
            )),
            status: Arc::new(StatusUseCase::new(
                self.gateway.clone(),
                Arc::clone(&self.ledger),
                Arc::clone(&self.queue),
                Arc::clone(&self.settings),
                Arc::clone(&self.calendar),
                Arc::clone(&self.clock),
            )),
            control: Arc::new(ControlUseCase::new(
                Arc::clone(&self.queue),
                Arc::clone(&self.settings),
                Arc::clone(&self.notifier),
            )),
            reconcile: Arc::clone(&self.reconcile),
            ledger: Arc::clone(&self.ledger),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Bound for the in-flight order to finish at shutdown.
    pub const fn shutdown_grace(&self) -> Duration {
        // Order wait plus one poll of slack.
        Duration::from_secs(self.config.broker.order_timeout_secs + 1)
    }
}

/// Telegram when enabled, otherwise the log.
///
/// # Errors
///
/// Fails when Telegram is enabled but its client cannot be built.
pub fn build_notifier(config: &Config) -> Result<Arc<dyn NotifierPort>, ContainerError> {
    if let Some(telegram) = config.notifications.telegram.telegram_config() {
        info!("Telegram notifications enabled");
        return Ok(Arc::new(TelegramNotifier::new(&telegram)?));
    }
    Ok(Arc::new(LogNotifier))
}
