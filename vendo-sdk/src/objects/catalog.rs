use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A product as listed by the catalog endpoint.
///
/// `quantity` is the stock currently available in the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub image: Option<String>,
}

impl Product {
    pub fn is_out_of_stock(&self) -> bool {
        self.quantity == 0
    }
}
