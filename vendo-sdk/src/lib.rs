//! Wire types shared between the kiosk and the vending backend.
//!
//! The HTTP client lives behind the `client` feature so crates that only
//! need the message shapes do not pull in `reqwest`.

pub mod objects;

#[cfg(feature = "client")]
pub mod client;
