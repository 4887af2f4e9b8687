//! Shopping cart.
//!
//! Every mutation keeps `quantity` within `1..=stock_at_add_time`. Carts
//! restored with [`Cart::from_lines`] are not re-validated here; the
//! checkout preconditions catch any line that violates the bound.

use rust_decimal::Decimal;
use thiserror::Error;
use vendo_sdk::objects::{OrderProduct, Product};

/// Errors returned by cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("product {0} is out of stock")]
    OutOfStock(i64),

    #[error("cannot add more than available stock ({stock}) of product {product_id}")]
    StockLimit { product_id: i64, stock: u32 },

    #[error("quantity of product {0} cannot go below 1")]
    MinimumQuantity(i64),

    #[error("no cart line at index {0}")]
    NoSuchLine(usize),
}

/// A single product line in the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: i64,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    /// Stock reported by the catalog when the product was first added.
    pub stock_at_add_time: u32,
}

impl CartLine {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    pub fn exceeds_stock(&self) -> bool {
        self.quantity > self.stock_at_add_time
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a cart carried over from another screen.
    pub fn from_lines(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Add one unit of `product`, creating the line if needed.
    pub fn add_product(&mut self, product: &Product) -> Result<(), CartError> {
        if let Some(index) = self.lines.iter().position(|l| l.product_id == product.id) {
            return self.increase(index);
        }
        if product.is_out_of_stock() {
            return Err(CartError::OutOfStock(product.id));
        }
        self.lines.push(CartLine {
            product_id: product.id,
            name: product.name.clone(),
            unit_price: product.price,
            quantity: 1,
            stock_at_add_time: product.quantity,
        });
        Ok(())
    }

    pub fn increase(&mut self, index: usize) -> Result<(), CartError> {
        let line = self
            .lines
            .get_mut(index)
            .ok_or(CartError::NoSuchLine(index))?;
        if line.quantity >= line.stock_at_add_time {
            return Err(CartError::StockLimit {
                product_id: line.product_id,
                stock: line.stock_at_add_time,
            });
        }
        line.quantity += 1;
        Ok(())
    }

    pub fn decrease(&mut self, index: usize) -> Result<(), CartError> {
        let line = self
            .lines
            .get_mut(index)
            .ok_or(CartError::NoSuchLine(index))?;
        if line.quantity <= 1 {
            return Err(CartError::MinimumQuantity(line.product_id));
        }
        line.quantity -= 1;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<CartLine, CartError> {
        if index >= self.lines.len() {
            return Err(CartError::NoSuchLine(index));
        }
        Ok(self.lines.remove(index))
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn total(&self) -> Decimal {
        self.lines.iter().map(CartLine::subtotal).sum()
    }

    pub fn total_quantity(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// The `{id, quantity}` list submitted with an order.
    pub fn order_products(&self) -> Vec<OrderProduct> {
        self.lines
            .iter()
            .map(|l| OrderProduct {
                id: l.product_id,
                quantity: l.quantity,
            })
            .collect()
    }
}
