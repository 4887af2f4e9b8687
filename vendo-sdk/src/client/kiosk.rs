//! Kiosk API client (kiosk front end → vending backend).

use std::sync::Arc;

use reqwest::Client;
use url::Url;

use super::ClientError;
use super::credentials::{ADMIN_ID_FIELD, CredentialProvider, NoCredentials, inject_into_body};
use crate::objects::{BalanceResponse, CardSnapshot, OrderRequest, OrderResponse, Product};

/// Typed HTTP client for the vending backend.
///
/// None of the calls retry. Order submission in particular must reach the
/// backend at most once per user action.
#[derive(Clone)]
pub struct KioskClient {
    http: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl KioskClient {
    /// Create a new `KioskClient` that sends no admin credential.
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
            credentials: Arc::new(NoCredentials),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts or a proxy).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = credentials;
        self
    }

    /// `GET /api/products` – list the catalog.
    pub async fn list_products(&self) -> Result<Vec<Product>, ClientError> {
        let mut url = self.base_url.join("/api/products")?;
        if let Some(admin_id) = self.credentials.admin_id() {
            url.query_pairs_mut().append_pair(ADMIN_ID_FIELD, &admin_id);
        }

        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `POST /api/balance` – fetch the spendable balance for a card.
    pub async fn fetch_balance(
        &self,
        card: &CardSnapshot,
    ) -> Result<BalanceResponse, ClientError> {
        let url = self.base_url.join("/api/balance")?;
        let body = inject_into_body(self.credentials.as_ref(), serde_json::to_value(card)?);

        let resp = self.http.post(url).json(&body).send().await?;
        parse_response(resp).await
    }

    /// `POST /api/order` – submit an order for the given card.
    pub async fn submit_order(&self, order: &OrderRequest) -> Result<OrderResponse, ClientError> {
        let url = self.base_url.join("/api/order")?;
        let body = inject_into_body(self.credentials.as_ref(), serde_json::to_value(order)?);

        let resp = self.http.post(url).json(&body).send().await?;
        parse_response(resp).await
    }
}

impl std::fmt::Debug for KioskClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KioskClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
