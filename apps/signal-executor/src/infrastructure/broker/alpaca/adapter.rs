//! Alpaca broker adapter implementing BrokerPort.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::application::ports::{
    BrokerError, BrokerPort, BrokerPosition, Instrument, MarketOrderRequest, OrderAck,
    PriceSnapshot,
};
use crate::domain::shared::{BrokerOrderId, Ticker};

use super::api_types::{
    AlpacaAccountResponse, AlpacaAssetResponse, AlpacaOrderRequest, AlpacaOrderResponse,
    AlpacaPositionResponse, AlpacaSnapshotResponse,
};
use super::config::{AlpacaConfig, AlpacaEnvironment};
use super::error::AlpacaError;
use super::http_client::AlpacaHttpClient;

/// Alpaca Markets broker adapter.
///
/// Stateless over HTTP: "connecting" verifies the credentials against the
/// account endpoint, and every later call authenticates on its own.
#[derive(Debug, Clone)]
pub struct AlpacaBrokerAdapter {
    client: AlpacaHttpClient,
    environment: AlpacaEnvironment,
}

impl AlpacaBrokerAdapter {
    /// Create a new Alpaca broker adapter.
    ///
    /// # Errors
    ///
    /// Fails when credentials are missing or the HTTP client cannot be built.
    pub fn new(config: &AlpacaConfig) -> Result<Self, AlpacaError> {
        Ok(Self {
            client: AlpacaHttpClient::new(config)?,
            environment: config.environment,
        })
    }

    /// Check if we're in live trading mode.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.environment.is_live()
    }

    fn to_alpaca_order_request(request: &MarketOrderRequest) -> AlpacaOrderRequest {
        AlpacaOrderRequest {
            symbol: request.instrument.broker_symbol.clone(),
            qty: request.quantity.normalize().to_string(),
            side: request.side.label(),
            order_type: "market",
            time_in_force: "day",
            client_order_id: request.client_order_id.as_str().to_string(),
        }
    }

    async fn account(&self) -> Result<AlpacaAccountResponse, AlpacaError> {
        self.client.get("/v2/account").await
    }
}

#[async_trait]
impl BrokerPort for AlpacaBrokerAdapter {
    async fn connect(&self) -> Result<(), BrokerError> {
        let account = self.account().await.map_err(|e| match e {
            // Alpaca answers bad keys with 403 as often as 401.
            AlpacaError::Rejected(_) => AlpacaError::AuthenticationFailed,
            other => other,
        })?;
        if account.trading_blocked {
            warn!(account_id = %account.id, "Alpaca account is blocked from trading");
        }
        info!(
            account_id = %account.id,
            status = account.status.as_deref().unwrap_or("unknown"),
            environment = %self.environment,
            "Alpaca session verified"
        );
        Ok(())
    }

    async fn qualify(&self, ticker: &Ticker) -> Result<Instrument, BrokerError> {
        let symbol = ticker.as_str();
        let asset: AlpacaAssetResponse = match self
            .client
            .get(&format!("/v2/assets/{symbol}"))
            .await
        {
            Ok(asset) => asset,
            Err(AlpacaError::NotFound { .. }) => {
                return Err(BrokerError::ContractNotFound {
                    ticker: ticker.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if !asset.tradable {
            return Err(AlpacaError::NotTradable(ticker.to_string()).into());
        }
        Ok(Instrument {
            ticker: ticker.clone(),
            broker_symbol: asset.symbol,
        })
    }

    async fn snapshot(&self, instrument: &Instrument) -> Result<PriceSnapshot, BrokerError> {
        let path = format!("/v2/stocks/{}/snapshot", instrument.broker_symbol);
        match self.client.data_get::<AlpacaSnapshotResponse>(&path).await {
            Ok(snapshot) => Ok(snapshot.into()),
            // No data for the symbol yet; the caller treats it as no price.
            Err(AlpacaError::NotFound { .. }) => Ok(PriceSnapshot::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn submit_market_order(
        &self,
        request: MarketOrderRequest,
    ) -> Result<OrderAck, BrokerError> {
        let body = Self::to_alpaca_order_request(&request);
        if self.is_live() {
            warn!(
                client_order_id = %request.client_order_id,
                symbol = %body.symbol,
                "Submitting LIVE order"
            );
        }

        let response: AlpacaOrderResponse = self.client.post_once("/v2/orders", &body).await?;
        info!(
            client_order_id = %request.client_order_id,
            broker_order_id = %response.id,
            status = %response.status,
            side = body.side,
            qty = %body.qty,
            "Alpaca accepted order"
        );
        Ok(response.to_order_ack()?)
    }

    async fn get_order(&self, broker_order_id: &BrokerOrderId) -> Result<OrderAck, BrokerError> {
        let response: AlpacaOrderResponse = self
            .client
            .get(&format!("/v2/orders/{}", broker_order_id.as_str()))
            .await?;
        Ok(response.to_order_ack()?)
    }

    async fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), BrokerError> {
        self.client
            .delete(&format!("/v2/orders/{}", broker_order_id.as_str()))
            .await
            .map_err(BrokerError::from)
    }

    async fn available_cash(&self) -> Result<Decimal, BrokerError> {
        Ok(self.account().await?.cash()?)
    }

    async fn positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let positions: Vec<AlpacaPositionResponse> = self.client.get("/v2/positions").await?;
        positions
            .iter()
            .map(|p| p.to_position().map_err(BrokerError::from))
            .collect()
    }
}
