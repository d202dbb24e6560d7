//! Alpaca-specific error types.

use thiserror::Error;

use crate::application::ports::BrokerError;

/// Errors from the Alpaca adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlpacaError {
    /// The request never got an HTTP response.
    #[error("Network error: {0}")]
    Network(String),

    /// Retries ran out on a transient failure.
    #[error("Gave up after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        /// Attempts made.
        attempts: u32,
        /// The last failure seen.
        last: String,
    },

    /// Credentials were refused.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Throttled and out of retries.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Suggested retry delay in seconds.
        retry_after_secs: u64,
    },

    /// The resource does not exist.
    #[error("Not found: {resource}")]
    NotFound {
        /// Request path that returned 404.
        resource: String,
    },

    /// The request was understood and refused (403/422).
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The asset exists but cannot be traded.
    #[error("Asset not tradable: {0}")]
    NotTradable(String),

    /// Any other non-success status.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the body.
        message: String,
    },

    /// A response body did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl From<AlpacaError> for BrokerError {
    fn from(err: AlpacaError) -> Self {
        match err {
            AlpacaError::Network(_)
            | AlpacaError::MaxRetriesExceeded { .. }
            | AlpacaError::AuthenticationFailed => Self::ConnectionError {
                message: err.to_string(),
            },
            AlpacaError::RateLimited { .. } => Self::RateLimited,
            AlpacaError::NotFound { resource } => Self::OrderNotFound { order_id: resource },
            AlpacaError::NotTradable(symbol) => Self::ContractNotFound { ticker: symbol },
            AlpacaError::Rejected(reason) => {
                if reason.to_ascii_lowercase().contains("insufficient") {
                    Self::InsufficientFunds
                } else {
                    Self::OrderRejected { reason }
                }
            }
            AlpacaError::Api { .. } | AlpacaError::Decode(_) => Self::Unknown {
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_connectivity() {
        for err in [
            AlpacaError::Network("connection refused".to_string()),
            AlpacaError::MaxRetriesExceeded {
                attempts: 3,
                last: "503".to_string(),
            },
            AlpacaError::AuthenticationFailed,
        ] {
            assert!(BrokerError::from(err).is_connectivity());
        }
    }

    #[test]
    fn insufficient_buying_power_is_recognised() {
        let err = AlpacaError::Rejected("insufficient buying power".to_string());
        assert_eq!(BrokerError::from(err), BrokerError::InsufficientFunds);

        let err = AlpacaError::Rejected("qty must be > 0".to_string());
        assert!(matches!(
            BrokerError::from(err),
            BrokerError::OrderRejected { .. }
        ));
    }

    #[test]
    fn untradable_asset_maps_to_contract_not_found() {
        let err = AlpacaError::NotTradable("ZZZZ".to_string());
        assert_eq!(
            BrokerError::from(err),
            BrokerError::ContractNotFound {
                ticker: "ZZZZ".to_string()
            }
        );
    }

    #[test]
    fn decode_failures_are_not_connectivity() {
        let err = AlpacaError::Decode("missing field".to_string());
        assert!(!BrokerError::from(err).is_connectivity());
    }
}
