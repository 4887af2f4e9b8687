//! Backend adapters: plug [`KioskClient`] into the core processors.

use async_trait::async_trait;
use rust_decimal::Decimal;
use vendo_core::balance::{BalanceError, BalanceSource};
use vendo_core::checkout::{OrderSubmitter, SubmitError};
use vendo_sdk::client::{ClientError, KioskClient};
use vendo_sdk::objects::{BalanceResponse, CardSnapshot, OrderRequest, OrderResponse};

/// Balance lookups through `POST /api/balance`.
#[derive(Debug, Clone)]
pub struct BackendBalance {
    client: KioskClient,
}

impl BackendBalance {
    pub fn new(client: KioskClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BalanceSource for BackendBalance {
    async fn fetch_balance(&self, card: &CardSnapshot) -> Result<Decimal, BalanceError> {
        match self.client.fetch_balance(card).await {
            Ok(response) => balance_from_response(response),
            Err(e) => Err(balance_error(e)),
        }
    }
}

fn balance_from_response(response: BalanceResponse) -> Result<Decimal, BalanceError> {
    match response {
        BalanceResponse {
            success: true,
            balance: Some(amount),
            ..
        } => Ok(amount),
        BalanceResponse { error, .. } => Err(BalanceError::Rejected(error)),
    }
}

fn balance_error(e: ClientError) -> BalanceError {
    match e.server_reason() {
        Some(reason) => BalanceError::Rejected(Some(reason)),
        None => BalanceError::Request(e.to_string()),
    }
}

/// Order submission through `POST /api/order`.
#[derive(Debug, Clone)]
pub struct BackendOrders {
    client: KioskClient,
}

impl BackendOrders {
    pub fn new(client: KioskClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrderSubmitter for BackendOrders {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderResponse, SubmitError> {
        self.client
            .submit_order(order)
            .await
            .map_err(|e| SubmitError {
                reason: e.server_reason(),
                message: e.to_string(),
            })
    }
}
