pub mod balance;
pub mod card;
pub mod catalog;
pub mod order;

pub use balance::BalanceResponse;
pub use card::{CardIdentity, CardSnapshot};
pub use catalog::Product;
pub use order::{ConfirmedLine, OrderProduct, OrderRequest, OrderResponse};
