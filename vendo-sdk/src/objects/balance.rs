//! Balance query response.
//!
//! The request body is the [`CardSnapshot`](super::CardSnapshot) itself.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub success: bool,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub balance: Option<Decimal>,
    #[serde(default)]
    pub error: Option<String>,
}
