//! Service-level error taxonomy.
//!
//! Every failure the pipeline reports to a caller falls into one of seven
//! kinds. Each [`ErrorCode`] belongs to exactly one kind and carries a
//! stable reason string and an HTTP status.
//!
//! | Kind | HTTP | Operator action |
//! |------|------|-----------------|
//! | `VALIDATION` | 400 | fix the caller |
//! | `DUPLICATE` | 200 | none |
//! | `GATING` | 409 | none, expected |
//! | `BROKER_CONNECTIVITY` | 503 | none, auto-retried |
//! | `BROKER_BUSINESS` | 422 | review the order |
//! | `PERSISTENCE` | 500 | investigate, reconcile |
//! | `INTERNAL` | 500 | investigate |

use std::collections::HashMap;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::ports::PersistenceError;
use crate::application::services::GatewayError;
use crate::application::use_cases::{ControlError, IntakeError, ReconcileError};
use crate::domain::signal::SignalError;

/// Failure class, used for recovery policy and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed input, rejected before enqueue.
    Validation,
    /// Known idempotency key.
    Duplicate,
    /// Outside hours, paused, killed, or over a risk limit.
    Gating,
    /// Broker session down.
    BrokerConnectivity,
    /// Broker refused or did not fill.
    BrokerBusiness,
    /// Store read or write failed.
    Persistence,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Whether the kind is part of normal operation.
    #[must_use]
    pub const fn is_expected(self) -> bool {
        matches!(self, Self::Duplicate | Self::Gating)
    }
}

/// Error codes reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation
    /// Body is not a valid request.
    InvalidRequest,
    /// Action is not BUY or SELL.
    InvalidAction,
    /// Ticker failed validation.
    InvalidTicker,
    /// Idempotency key too long.
    InvalidIdempotencyKey,
    /// Unknown control command.
    UnknownCommand,
    /// Risk limit out of range.
    InvalidSettings,

    // Duplicate
    /// Signal already accepted.
    DuplicateSignal,

    // Broker connectivity
    /// Broker session unavailable.
    BrokerUnavailable,

    // Broker business
    /// No tradable contract.
    ContractNotFound,
    /// Broker refused the request.
    BrokerRejected,

    // Persistence
    /// Store unavailable or query failed.
    StorageError,
    /// Stored data contradicts itself.
    StorageIntegrity,

    // Internal
    /// Unexpected failure.
    InternalError,
}

impl ErrorCode {
    /// The failure class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest
            | Self::InvalidAction
            | Self::InvalidTicker
            | Self::InvalidIdempotencyKey
            | Self::UnknownCommand
            | Self::InvalidSettings => ErrorKind::Validation,
            Self::DuplicateSignal => ErrorKind::Duplicate,
            Self::BrokerUnavailable => ErrorKind::BrokerConnectivity,
            Self::ContractNotFound | Self::BrokerRejected => ErrorKind::BrokerBusiness,
            Self::StorageError | Self::StorageIntegrity => ErrorKind::Persistence,
            Self::InternalError => ErrorKind::Internal,
        }
    }

    /// HTTP status for this code.
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Duplicate => StatusCode::OK,
            ErrorKind::Gating => StatusCode::CONFLICT,
            ErrorKind::BrokerConnectivity => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::BrokerBusiness => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Persistence | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InvalidAction => "INVALID_ACTION",
            Self::InvalidTicker => "INVALID_TICKER",
            Self::InvalidIdempotencyKey => "INVALID_IDEMPOTENCY_KEY",
            Self::UnknownCommand => "UNKNOWN_COMMAND",
            Self::InvalidSettings => "INVALID_SETTINGS",
            Self::DuplicateSignal => "DUPLICATE_SIGNAL",
            Self::BrokerUnavailable => "BROKER_UNAVAILABLE",
            Self::ContractNotFound => "CONTRACT_NOT_FOUND",
            Self::BrokerRejected => "BROKER_REJECTED",
            Self::StorageError => "STORAGE_ERROR",
            Self::StorageIntegrity => "STORAGE_INTEGRITY",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// An error with a code and context, returned by the HTTP surface.
#[derive(Debug, Error)]
pub struct ServiceError {
    code: ErrorCode,
    message: String,
    context: Vec<(String, String)>,
}

impl ServiceError {
    /// Create a new service error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Add context to the error.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    /// Get the error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the context.
    #[must_use]
    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }

    /// Body sent to HTTP callers.
    #[must_use]
    pub fn to_http_response(&self) -> HttpErrorResponse {
        HttpErrorResponse {
            code: self.code.reason().to_string(),
            kind: self.code.kind(),
            message: self.message.clone(),
            details: self.context.iter().cloned().collect(),
        }
    }

    /// Unknown control command.
    #[must_use]
    pub fn unknown_command(name: &str) -> Self {
        Self::new(ErrorCode::UnknownCommand, format!("Unknown command '{name}'"))
            .with_context("command", name)
    }

    /// Internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.reason(), self.message)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        if matches!(self.code.kind(), ErrorKind::Persistence | ErrorKind::Internal) {
            tracing::error!(code = %self.code, message = %self.message, "Request failed");
        }
        (self.code.http_status(), Json(self.to_http_response())).into_response()
    }
}

/// HTTP error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpErrorResponse {
    /// Reason string.
    pub code: String,
    /// Failure class.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Additional details.
    pub details: HashMap<String, String>,
}

impl From<SignalError> for ServiceError {
    fn from(err: SignalError) -> Self {
        let code = match err {
            SignalError::InvalidAction(_) => ErrorCode::InvalidAction,
            SignalError::InvalidTicker(_) => ErrorCode::InvalidTicker,
            SignalError::KeyTooLong { .. } => ErrorCode::InvalidIdempotencyKey,
        };
        Self::new(code, err.to_string())
    }
}

impl From<PersistenceError> for ServiceError {
    fn from(err: PersistenceError) -> Self {
        let code = match err {
            PersistenceError::Integrity(_) => ErrorCode::StorageIntegrity,
            _ => ErrorCode::StorageError,
        };
        Self::new(code, err.to_string())
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        let code = match err {
            GatewayError::NotConnected | GatewayError::Connectivity(_) => {
                ErrorCode::BrokerUnavailable
            }
            GatewayError::ContractNotFound(_) => ErrorCode::ContractNotFound,
            GatewayError::Rejected(_) => ErrorCode::BrokerRejected,
            GatewayError::Broker(_) => ErrorCode::InternalError,
        };
        Self::new(code, err.to_string())
    }
}

impl From<IntakeError> for ServiceError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::Validation(e) => e.into(),
            IntakeError::Persistence(e) => e.into(),
        }
    }
}

impl From<ControlError> for ServiceError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::Invalid(e) => Self::new(ErrorCode::InvalidSettings, e.to_string()),
            ControlError::Persistence(e) => e.into(),
        }
    }
}

impl From<ReconcileError> for ServiceError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Gateway(e) => e.into(),
            ReconcileError::Persistence(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::Ticker;

    #[test]
    fn test_error_code_kinds() {
        assert_eq!(ErrorCode::InvalidTicker.kind(), ErrorKind::Validation);
        assert_eq!(ErrorCode::DuplicateSignal.kind(), ErrorKind::Duplicate);
        assert_eq!(ErrorCode::BrokerUnavailable.kind(), ErrorKind::BrokerConnectivity);
        assert_eq!(ErrorCode::ContractNotFound.kind(), ErrorKind::BrokerBusiness);
        assert_eq!(ErrorCode::StorageIntegrity.kind(), ErrorKind::Persistence);
        assert!(ErrorKind::Gating.is_expected());
        assert!(!ErrorKind::Persistence.is_expected());
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ErrorCode::InvalidAction.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::BrokerUnavailable.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::StorageError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_signal_errors_map_to_validation_codes() {
        let err: ServiceError = SignalError::from(Ticker::parse("").unwrap_err()).into();
        assert_eq!(err.code(), ErrorCode::InvalidTicker);

        let err: ServiceError = SignalError::KeyTooLong { len: 101 }.into();
        assert_eq!(err.code(), ErrorCode::InvalidIdempotencyKey);
        assert!(err.message().contains("101"));
    }

    #[test]
    fn test_gateway_errors_split_by_kind() {
        let err: ServiceError = GatewayError::NotConnected.into();
        assert_eq!(err.code(), ErrorCode::BrokerUnavailable);
        let err: ServiceError = GatewayError::Rejected("no".to_string()).into();
        assert_eq!(err.code(), ErrorCode::BrokerRejected);
    }

    #[test]
    fn test_to_http_response() {
        let error = ServiceError::unknown_command("explode");
        let response = error.to_http_response();

        assert_eq!(response.code, "UNKNOWN_COMMAND");
        assert_eq!(response.kind, ErrorKind::Validation);
        assert_eq!(response.details.get("command").map(String::as_str), Some("explode"));
    }

    #[test]
    fn test_error_display() {
        let error = ServiceError::internal("boom").with_context("at", "status");
        assert_eq!(error.to_string(), "[INTERNAL_ERROR] boom");
        assert_eq!(error.context().len(), 1);
    }
}
