//! Order submission request and response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// A single `{id, quantity}` entry of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProduct {
    pub id: i64,
    pub quantity: u32,
}

/// Request body for `POST /api/order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub products: Vec<OrderProduct>,
    pub card_identity: String,
}

/// Response returned by the order endpoint, on success and on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub success: bool,
    /// Lines that fail to decode are dropped one by one, so a malformed
    /// line never turns an accepted order into a decode error.
    #[serde(default, deserialize_with = "lenient_lines")]
    pub cart: Option<Vec<ConfirmedLine>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A backend-confirmed cart line.
///
/// Every field is optional on the wire: the backend is trusted for the
/// `failed` flag but lines missing an id or a positive quantity are
/// dropped before dispensing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedLine {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub image: Option<String>,
}

fn lenient_lines<'de, D>(deserializer: D) -> Result<Option<Vec<ConfirmedLine>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.map(|value| match value {
        serde_json::Value::Array(lines) => lines
            .into_iter()
            .filter_map(|line| serde_json::from_value(line).ok())
            .collect(),
        _ => Vec::new(),
    }))
}
