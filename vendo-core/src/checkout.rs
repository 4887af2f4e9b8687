//! Checkout orchestration.
//!
//! Preconditions are checked in a fixed order and the first failure wins:
//! empty cart, stock exceeded, no card, insufficient balance. Once they
//! hold, the order is submitted exactly once. There is no client-side
//! retry and no second submission while one is outstanding.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};
use vendo_sdk::objects::{ConfirmedLine, OrderRequest, OrderResponse};

use crate::balance::Balance;
use crate::cart::Cart;
use crate::session::SessionView;

/// Reason shown when the backend refuses an order without saying why.
pub const GENERIC_ORDER_FAILURE: &str = "Order failed. Try again.";
/// Reason shown when the order call itself fails without a server reason.
pub const GENERIC_SUBMISSION_FAILURE: &str = "Error while placing order. Please try again.";

/// A failed checkout precondition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutRefusal {
    #[error("Cart is empty!")]
    EmptyCart,

    #[error("Some items exceed available stock!")]
    StockExceeded { product_id: i64 },

    #[error("Please insert the card for checkout")]
    NoCard,

    #[error("Insufficient balance")]
    InsufficientBalance {
        required: Decimal,
        /// `None` while the balance is unknown or still being checked.
        available: Option<Decimal>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Refused(#[from] CheckoutRefusal),

    /// Another submission is still awaiting its response.
    #[error("checkout already in progress")]
    InProgress,

    /// The backend refused the order or could not be reached.
    #[error("{0}")]
    SubmissionFailed(String),
}

/// Failure of the order call itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("order submission failed: {message}")]
pub struct SubmitError {
    /// Reason supplied by the server, shown verbatim when present.
    pub reason: Option<String>,
    pub message: String,
}

/// The order endpoint.
#[async_trait]
pub trait OrderSubmitter: Send + Sync {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderResponse, SubmitError>;
}

#[async_trait]
impl<T: OrderSubmitter + ?Sized> OrderSubmitter for Arc<T> {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderResponse, SubmitError> {
        (**self).submit_order(order).await
    }
}

/// A backend-confirmed order, ready for dispensing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedOrder {
    pub lines: Vec<ConfirmedLine>,
}

/// Check the checkout preconditions in order.
pub fn precheck(
    cart: &Cart,
    session: &SessionView,
    balance: &Balance,
) -> Result<(), CheckoutRefusal> {
    if cart.is_empty() {
        return Err(CheckoutRefusal::EmptyCart);
    }
    if let Some(line) = cart.lines().iter().find(|l| l.exceeds_stock()) {
        return Err(CheckoutRefusal::StockExceeded {
            product_id: line.product_id,
        });
    }
    let Some(card) = session.present_card() else {
        return Err(CheckoutRefusal::NoCard);
    };
    let required = cart.total();
    let available = balance.amount_for(&card.identity());
    match available {
        Some(amount) if amount >= required => Ok(()),
        _ => Err(CheckoutRefusal::InsufficientBalance {
            required,
            available,
        }),
    }
}

/// What the checkout button should say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutAvailability {
    InsertCard,
    CheckingBalance,
    InsufficientBalance,
    Submitting,
    Ready,
}

impl CheckoutAvailability {
    pub fn evaluate(
        cart: &Cart,
        session: &SessionView,
        balance: &Balance,
        submitting: bool,
    ) -> Self {
        if submitting {
            return Self::Submitting;
        }
        let Some(card) = session.present_card() else {
            return Self::InsertCard;
        };
        if balance.checking {
            return Self::CheckingBalance;
        }
        match balance.amount_for(&card.identity()) {
            Some(amount) if amount >= cart.total() => Self::Ready,
            _ => Self::InsufficientBalance,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::InsertCard => "Insert Card to Checkout",
            Self::CheckingBalance => "Checking Balance",
            Self::InsufficientBalance => "Insufficient Balance",
            Self::Submitting => "Placing Order",
            Self::Ready => "Proceed to Checkout",
        }
    }

    pub fn enabled(self) -> bool {
        self == Self::Ready
    }
}

/// Gates and submits orders.
pub struct CheckoutOrchestrator<S> {
    submitter: S,
    submitting: AtomicBool,
}

impl<S: OrderSubmitter> CheckoutOrchestrator<S> {
    pub fn new(submitter: S) -> Self {
        Self {
            submitter,
            submitting: AtomicBool::new(false),
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// Validate, submit, and on success clear `cart`.
    ///
    /// On any failure the cart is left untouched so the user can retry.
    pub async fn attempt_checkout(
        &self,
        cart: &mut Cart,
        session: &SessionView,
        balance: &Balance,
    ) -> Result<ConfirmedOrder, CheckoutError> {
        precheck(cart, session, balance)?;
        let Some(card) = session.present_card() else {
            return Err(CheckoutRefusal::NoCard.into());
        };

        if self
            .submitting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CheckoutError::InProgress);
        }
        let _guard = SubmittingGuard(&self.submitting);

        let request = OrderRequest {
            products: cart.order_products(),
            card_identity: card.user_id.clone(),
        };
        info!(
            card = %card.identity(),
            lines = request.products.len(),
            total = %cart.total(),
            "Submitting order"
        );

        match self.submitter.submit_order(&request).await {
            Ok(response) if response.success => {
                let lines = response.cart.unwrap_or_default();
                info!(lines = lines.len(), "Order confirmed");
                cart.clear();
                Ok(ConfirmedOrder { lines })
            }
            Ok(response) => {
                let reason = response
                    .error
                    .unwrap_or_else(|| GENERIC_ORDER_FAILURE.to_string());
                warn!(reason = %reason, "Order refused by backend");
                Err(CheckoutError::SubmissionFailed(reason))
            }
            Err(e) => {
                warn!(error = %e, "Order submission failed");
                Err(CheckoutError::SubmissionFailed(
                    e.reason
                        .unwrap_or_else(|| GENERIC_SUBMISSION_FAILURE.to_string()),
                ))
            }
        }
    }
}

struct SubmittingGuard<'a>(&'a AtomicBool);

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
