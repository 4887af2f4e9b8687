//! Card reader payloads.
//!
//! The reader publishes either a JSON object describing the inserted card
//! or the JSON literal `null` when no card is present.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identity of a physical card, as reported by the reader.
///
/// Two snapshots with the same identity refer to the same card even if
/// their `credit` differs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardIdentity(pub String);

impl std::fmt::Display for CardIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identity/credit tuple reported for the currently inserted card.
///
/// `credit` is the card-local value and may be stale; the balance fetched
/// from the backend is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSnapshot {
    #[serde(alias = "userid")]
    pub user_id: String,
    #[serde(alias = "username")]
    pub user_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub credit: Decimal,
}

impl CardSnapshot {
    pub fn identity(&self) -> CardIdentity {
        CardIdentity(self.user_id.clone())
    }
}

/// Decode a response-topic payload.
///
/// `Ok(None)` means the reader reported no card.
pub fn parse_card_payload(payload: &[u8]) -> Result<Option<CardSnapshot>, serde_json::Error> {
    serde_json::from_slice(payload)
}
