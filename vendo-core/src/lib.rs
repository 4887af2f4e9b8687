#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![forbid(unsafe_code)]

pub mod balance;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod dispensing;
pub mod events;
pub mod processors;
pub mod session;
