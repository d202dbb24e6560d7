//! HTTP Controller (Driver Adapter)
//!
//! Axum-based REST API that delegates to application use cases.
//! Authentication and webhook signature checks happen upstream.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{delete, get, patch, post},
};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use crate::application::ports::{
    BrokerPort, IntakeStorePort, LedgerPort, OrderQueuePort, SettingsPort,
};
use crate::application::use_cases::{
    ControlCommand, ControlUseCase, IntakeOutcome, IntakeSignalUseCase, ReconcileUseCase,
    StatusReport, StatusUseCase,
};
use crate::domain::reconciliation::ReconciliationResult;
use crate::domain::risk_management::{RiskSettings, RiskSettingsPatch};
use crate::domain::signal::SignalRequest;
use crate::error::{ErrorCode, ServiceError};

use super::request::TradesQuery;
use super::response::{
    ClearQueueResponse, ControlResponse, HealthResponse, PositionsResponse, SignalResponse,
    TradesResponse,
};

/// Application state shared across handlers.
pub struct AppState<B, L, Q, S, I>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
    I: IntakeStorePort,
{
    /// Use case for accepting signals.
    pub intake: Arc<IntakeSignalUseCase<I>>,
    /// Use case for the status snapshot.
    pub status: Arc<StatusUseCase<B, L, Q, S>>,
    /// Use case for operator commands.
    pub control: Arc<ControlUseCase<Q, S>>,
    /// Use case for on-demand reconciliation.
    pub reconcile: Arc<ReconcileUseCase<B, L>>,
    /// Ledger for position and trade queries.
    pub ledger: Arc<L>,
    /// Application version.
    pub version: String,
}

impl<B, L, Q, S, I> Clone for AppState<B, L, Q, S, I>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
    I: IntakeStorePort,
{
    fn clone(&self) -> Self {
        Self {
            intake: Arc::clone(&self.intake),
            status: Arc::clone(&self.status),
            control: Arc::clone(&self.control),
            reconcile: Arc::clone(&self.reconcile),
            ledger: Arc::clone(&self.ledger),
            version: self.version.clone(),
        }
    }
}

/// Create the HTTP router with all endpoints.
pub fn create_router<B, L, Q, S, I>(state: AppState<B, L, Q, S, I>) -> Router
where
    B: BrokerPort + 'static,
    L: LedgerPort + 'static,
    Q: OrderQueuePort + 'static,
    S: SettingsPort + 'static,
    I: IntakeStorePort + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/signals", post(receive_signal))
        .route("/api/v1/status", get(status))
        .route("/api/v1/control/{command}", post(control))
        .route("/api/v1/settings", patch(update_settings))
        .route("/api/v1/queue", delete(clear_queue))
        .route("/api/v1/positions", get(positions))
        .route("/api/v1/trades", get(trades))
        .route("/api/v1/reconcile", post(reconcile))
        .with_state(state)
}

fn bad_body(rejection: JsonRejection) -> ServiceError {
    ServiceError::new(ErrorCode::InvalidRequest, rejection.body_text())
}

/// Health check endpoint.
async fn health_check<B, L, Q, S, I>(
    State(state): State<AppState<B, L, Q, S, I>>,
) -> Json<HealthResponse>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
    I: IntakeStorePort,
{
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
    })
}

/// Signal intake: 202 when queued, 200 when a duplicate.
async fn receive_signal<B, L, Q, S, I>(
    State(state): State<AppState<B, L, Q, S, I>>,
    payload: Result<Json<SignalRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SignalResponse>), ServiceError>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
    I: IntakeStorePort,
{
    let Json(request) = payload.map_err(bad_body)?;
    let span = info_span!(
        "signal",
        request_id = %Uuid::new_v4(),
        action = %request.action,
        ticker = %request.ticker,
    );

    let outcome = state.intake.execute(&request).instrument(span).await?;
    let code = match outcome {
        IntakeOutcome::Queued { .. } => StatusCode::ACCEPTED,
        IntakeOutcome::Duplicate { .. } => StatusCode::OK,
    };
    Ok((code, Json(outcome.into())))
}

/// Pipeline status endpoint.
async fn status<B, L, Q, S, I>(
    State(state): State<AppState<B, L, Q, S, I>>,
) -> Result<Json<StatusReport>, ServiceError>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
    I: IntakeStorePort,
{
    Ok(Json(state.status.execute().await?))
}

/// Pause, resume, kill, or unkill.
async fn control<B, L, Q, S, I>(
    State(state): State<AppState<B, L, Q, S, I>>,
    Path(name): Path<String>,
) -> Result<Json<ControlResponse>, ServiceError>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
    I: IntakeStorePort,
{
    let command =
        ControlCommand::from_name(&name).ok_or_else(|| ServiceError::unknown_command(&name))?;
    let message = state.control.apply(command).await?;
    Ok(Json(ControlResponse {
        command: name,
        message: message.to_string(),
    }))
}

/// Change risk limits.
async fn update_settings<B, L, Q, S, I>(
    State(state): State<AppState<B, L, Q, S, I>>,
    payload: Result<Json<RiskSettingsPatch>, JsonRejection>,
) -> Result<Json<RiskSettings>, ServiceError>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
    I: IntakeStorePort,
{
    let Json(patch) = payload.map_err(bad_body)?;
    Ok(Json(state.control.update_settings(&patch).await?))
}

/// Emergency queue clear.
async fn clear_queue<B, L, Q, S, I>(
    State(state): State<AppState<B, L, Q, S, I>>,
) -> Result<Json<ClearQueueResponse>, ServiceError>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
    I: IntakeStorePort,
{
    let removed = state.control.clear_queue().await?;
    Ok(Json(ClearQueueResponse { removed }))
}

/// Open lots.
async fn positions<B, L, Q, S, I>(
    State(state): State<AppState<B, L, Q, S, I>>,
) -> Result<Json<PositionsResponse>, ServiceError>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
    I: IntakeStorePort,
{
    let lots = state.ledger.all_open_lots().await?;
    Ok(Json(PositionsResponse::new(lots)))
}

/// Most recent trades.
async fn trades<B, L, Q, S, I>(
    State(state): State<AppState<B, L, Q, S, I>>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<TradesResponse>, ServiceError>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
    I: IntakeStorePort,
{
    let trades = state.ledger.recent_trades(query.effective_limit()).await?;
    Ok(Json(TradesResponse { trades }))
}

/// Compare broker and ledger now, regardless of the session.
async fn reconcile<B, L, Q, S, I>(
    State(state): State<AppState<B, L, Q, S, I>>,
) -> Result<Json<ReconciliationResult>, ServiceError>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
    I: IntakeStorePort,
{
    Ok(Json(state.reconcile.execute().await?))
}
