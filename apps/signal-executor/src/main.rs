//! Signal Executor Binary
//!
//! Starts the HTTP intake, the order worker, and the background tasks.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin signal-executor
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `ALPACA_KEY`: Broker API key
//! - `ALPACA_SECRET`: Broker API secret
//!
//! ## Optional
//! - `SIGNAL_EXECUTOR_CONFIG`: Config file path (default: config.yaml, else built-in)
//! - `ALPACA_ENV`: PAPER | LIVE (default: PAPER)
//! - `TELEGRAM_ENABLED`, `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`: Operator alerts
//! - `RUST_LOG`: Log filter (default: `observability.log_level`)

use std::time::Duration;

use anyhow::Context;
use signal_executor::application::use_cases::forward_session_alerts;
use signal_executor::config::{Config, load_config, validate_startup_environment};
use signal_executor::infrastructure::config::Container;
use signal_executor::infrastructure::http::create_router;
use signal_executor::observability::init_metrics;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config = load_config(None).context("loading configuration")?;
    init_tracing(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Signal Executor");

    let validation = validate_startup_environment(&config)?;
    for warning in &validation.warnings {
        tracing::warn!("{warning}");
    }
    log_config(&config);

    if config.observability.metrics_enabled {
        let metrics = config.observability.metrics_config()?;
        match init_metrics(&metrics) {
            Ok(()) => tracing::info!(addr = %metrics.listen_addr, "Prometheus exporter listening"),
            Err(e) => tracing::warn!(error = %e, "Metrics disabled"),
        }
    }

    let container = Container::from_config(config)
        .await
        .context("wiring components")?;

    let gateway = container.gateway();
    if let Err(e) = gateway.connect().await {
        // The gateway keeps retrying on its own schedule; orders wait meanwhile.
        gateway.handle_disconnect(&format!("startup connect failed: {e}"));
    }

    let shutdown = CancellationToken::new();
    let mut tasks = JoinSet::new();

    let worker = container.execution_worker();
    let token = shutdown.clone();
    tasks.spawn(async move { worker.run(token).await });

    let watcher = container.market_open_watcher();
    let token = shutdown.clone();
    tasks.spawn(async move { watcher.run(token).await });

    if container.config().reconciliation.enabled {
        let reconciliation = container.reconciliation_task();
        let token = shutdown.clone();
        tasks.spawn(async move { reconciliation.run(token).await });
    }

    tasks.spawn(forward_session_alerts(
        gateway.subscribe(),
        container.notifier(),
        shutdown.clone(),
    ));

    let addr = container.config().server.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    let app = create_router(container.app_state());

    tracing::info!(%addr, "HTTP server listening");
    tracing::info!("Signal executor ready");

    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            token.cancel();
        })
        .await
        .context("HTTP server")?;

    shutdown.cancel();
    drain(tasks, container.shutdown_grace()).await;

    tracing::info!("Signal executor stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.observability.log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Log the parsed configuration.
fn log_config(config: &Config) {
    tracing::info!(
        environment = %config.broker.environment,
        http_addr = %config.server.listen_addr(),
        database = %config.persistence.database_url,
        max_orders_per_second = config.execution.max_orders_per_second,
        reconciliation = config.reconciliation.enabled,
        telegram = config.notifications.telegram.enabled,
        "Configuration loaded"
    );
}

/// Wait for background tasks, giving up after `grace`.
async fn drain(mut tasks: JoinSet<()>, grace: Duration) {
    let waited = tokio::time::timeout(grace, async {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Background task failed");
            }
        }
    })
    .await;

    if waited.is_err() {
        tracing::warn!(
            grace_secs = grace.as_secs(),
            "Background tasks still running at shutdown, aborting"
        );
        tasks.abort_all();
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
