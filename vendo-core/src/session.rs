//! Card presence session.
//!
//! Reduces the raw transport stream into a debounced, UI-facing view of
//! card presence. The transition function is pure: it never touches a
//! clock or a timer, it only returns the [`Effect`]s the owner must carry
//! out. [`CardSessionDriver`](crate::processors::CardSessionDriver) owns
//! the actual removal timer.
//!
//! Invariants:
//! - at most one removal timer is pending at a time;
//! - every inbound message cancels a pending removal timer before it is
//!   evaluated;
//! - a non-null snapshot always yields `CardPresent` with that snapshot;
//! - losing the transport never leaves a stale `CardPresent` visible.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use vendo_sdk::objects::card::parse_card_payload;
use vendo_sdk::objects::{CardIdentity, CardSnapshot};

use crate::events::TransportEvent;

/// Shown when the reader publishes something that is not a card snapshot.
pub const INVALID_CARD_DATA: &str = "Invalid card data received";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Transport not connected yet, or reconnecting.
    Connecting,
    /// Connected and no card is present.
    AwaitingCard,
    CardPresent(CardSnapshot),
    /// A `null` snapshot arrived while a card was present. `last` stays
    /// visible until `deadline` unless a newer message supersedes it.
    PendingRemoval {
        last: CardSnapshot,
        deadline: Instant,
    },
    TransportError(String),
}

impl SessionState {
    /// The snapshot the UI should display, if any.
    pub fn visible_card(&self) -> Option<&CardSnapshot> {
        match self {
            SessionState::CardPresent(card) => Some(card),
            SessionState::PendingRemoval { last, .. } => Some(last),
            _ => None,
        }
    }

    fn removal_deadline(&self) -> Option<Instant> {
        match self {
            SessionState::PendingRemoval { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }
}

/// What observers see: the state plus the last display error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub state: SessionState,
    /// Set by a malformed payload, cleared by the next well-formed message
    /// or a fresh connection.
    pub display_error: Option<String>,
}

impl SessionView {
    pub fn connecting() -> Self {
        Self {
            state: SessionState::Connecting,
            display_error: None,
        }
    }

    pub fn card(&self) -> Option<&CardSnapshot> {
        self.state.visible_card()
    }

    pub fn card_identity(&self) -> Option<CardIdentity> {
        self.card().map(CardSnapshot::identity)
    }

    /// Only a settled `CardPresent` permits checkout; a card pending
    /// removal is still displayed but cannot pay.
    pub fn present_card(&self) -> Option<&CardSnapshot> {
        match &self.state {
            SessionState::CardPresent(card) => Some(card),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, SessionState::Connecting)
    }
}

impl Default for SessionView {
    fn default() -> Self {
        Self::connecting()
    }
}

/// Inputs of the transition function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Transport(TransportEvent),
    /// The removal timer armed with `deadline` fired.
    RemovalElapsed { deadline: Instant },
}

impl From<TransportEvent> for SessionEvent {
    fn from(event: TransportEvent) -> Self {
        SessionEvent::Transport(event)
    }
}

/// Side effects requested by a transition, in the order they must run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartRemovalTimer { deadline: Instant },
    CancelRemovalTimer,
    /// The displayed card changed identity; its balance must be fetched.
    FetchBalance(CardSnapshot),
    /// No card is displayed any more.
    ClearBalance,
}

/// Compute the next view and the effects of applying `event` to `view`.
pub fn transition(
    view: &SessionView,
    event: SessionEvent,
    now: Instant,
    removal_timeout: Duration,
) -> (SessionView, Vec<Effect>) {
    let mut effects = Vec::new();
    let pending = view.state.removal_deadline().is_some();
    let cancel_pending = |effects: &mut Vec<Effect>| {
        if pending {
            effects.push(Effect::CancelRemovalTimer);
        }
    };

    let next = match event {
        SessionEvent::Transport(TransportEvent::Connected) => {
            // A pending removal keeps its timer.
            let state = match &view.state {
                SessionState::Connecting | SessionState::TransportError(_) => {
                    SessionState::AwaitingCard
                }
                other => other.clone(),
            };
            SessionView {
                state,
                display_error: None,
            }
        }
        SessionEvent::Transport(TransportEvent::Disconnected) => {
            cancel_pending(&mut effects);
            SessionView {
                state: SessionState::Connecting,
                display_error: view.display_error.clone(),
            }
        }
        SessionEvent::Transport(TransportEvent::Reconnecting) => {
            cancel_pending(&mut effects);
            let state = match &view.state {
                SessionState::TransportError(reason) => {
                    SessionState::TransportError(reason.clone())
                }
                _ => SessionState::Connecting,
            };
            SessionView {
                state,
                display_error: view.display_error.clone(),
            }
        }
        SessionEvent::Transport(TransportEvent::Error(reason)) => {
            cancel_pending(&mut effects);
            SessionView {
                state: SessionState::TransportError(reason),
                display_error: view.display_error.clone(),
            }
        }
        SessionEvent::Transport(TransportEvent::Message(payload)) => {
            match parse_card_payload(&payload) {
                Err(e) => {
                    warn!(error = %e, "Malformed card payload");
                    return (
                        SessionView {
                            state: view.state.clone(),
                            display_error: Some(INVALID_CARD_DATA.to_string()),
                        },
                        Vec::new(),
                    );
                }
                Ok(Some(card)) => {
                    cancel_pending(&mut effects);
                    SessionView {
                        state: SessionState::CardPresent(card),
                        display_error: None,
                    }
                }
                Ok(None) => {
                    cancel_pending(&mut effects);
                    let state = match &view.state {
                        SessionState::CardPresent(last)
                        | SessionState::PendingRemoval { last, .. } => {
                            let deadline = now + removal_timeout;
                            effects.push(Effect::StartRemovalTimer { deadline });
                            SessionState::PendingRemoval {
                                last: last.clone(),
                                deadline,
                            }
                        }
                        _ => SessionState::AwaitingCard,
                    };
                    SessionView {
                        state,
                        display_error: None,
                    }
                }
            }
        }
        SessionEvent::RemovalElapsed { deadline } => match &view.state {
            SessionState::PendingRemoval {
                deadline: armed, ..
            } if *armed == deadline => SessionView {
                state: SessionState::AwaitingCard,
                display_error: view.display_error.clone(),
            },
            _ => {
                debug!("Ignoring stale removal timer");
                return (view.clone(), Vec::new());
            }
        },
    };

    let before = view.card_identity();
    let after = next.card_identity();
    if before != after {
        match next.card() {
            Some(card) => effects.push(Effect::FetchBalance(card.clone())),
            None => effects.push(Effect::ClearBalance),
        }
    }

    (next, effects)
}

/// Stateful wrapper around [`transition`].
#[derive(Debug, Clone)]
pub struct CardSession {
    view: SessionView,
    removal_timeout: Duration,
}

impl CardSession {
    pub fn new(removal_timeout: Duration) -> Self {
        Self {
            view: SessionView::connecting(),
            removal_timeout,
        }
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    pub fn apply(&mut self, event: SessionEvent, now: Instant) -> Vec<Effect> {
        let (next, effects) = transition(&self.view, event, now, self.removal_timeout);
        self.view = next;
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rust_decimal::Decimal;

    const TIMEOUT: Duration = Duration::from_millis(5000);

    fn card_json(id: &str, credit: i64) -> TransportEvent {
        TransportEvent::Message(Bytes::from(format!(
            r#"{{"userId":"{id}","userName":"user {id}","credit":{credit}}}"#
        )))
    }

    fn null_msg() -> TransportEvent {
        TransportEvent::Message(Bytes::from_static(b"null"))
    }

    fn snapshot(id: &str, credit: i64) -> CardSnapshot {
        CardSnapshot {
            user_id: id.to_string(),
            user_name: format!("user {id}"),
            credit: Decimal::from(credit),
        }
    }

    fn connected_session() -> CardSession {
        let mut session = CardSession::new(TIMEOUT);
        session.apply(TransportEvent::Connected.into(), Instant::now());
        session
    }

    #[test]
    fn test_connect_then_card() {
        let mut session = CardSession::new(TIMEOUT);
        assert!(session.view().is_loading());

        let effects = session.apply(TransportEvent::Connected.into(), Instant::now());
        assert!(effects.is_empty());
        assert_eq!(session.view().state, SessionState::AwaitingCard);

        let effects = session.apply(card_json("1", 30).into(), Instant::now());
        assert_eq!(
            session.view().state,
            SessionState::CardPresent(snapshot("1", 30))
        );
        assert_eq!(effects, vec![Effect::FetchBalance(snapshot("1", 30))]);
    }

    #[test]
    fn test_null_starts_debounce_and_keeps_last_snapshot() {
        let mut session = connected_session();
        let now = Instant::now();
        session.apply(card_json("1", 30).into(), now);

        let effects = session.apply(null_msg().into(), now);
        let deadline = now + TIMEOUT;
        assert_eq!(effects, vec![Effect::StartRemovalTimer { deadline }]);
        assert_eq!(session.view().card(), Some(&snapshot("1", 30)));
        assert_eq!(session.view().present_card(), None);

        let effects = session.apply(SessionEvent::RemovalElapsed { deadline }, deadline);
        assert_eq!(session.view().state, SessionState::AwaitingCard);
        assert_eq!(effects, vec![Effect::ClearBalance]);
    }

    #[test]
    fn test_card_during_pending_removal_cancels_timer() {
        let mut session = connected_session();
        let now = Instant::now();
        session.apply(card_json("1", 30).into(), now);
        session.apply(null_msg().into(), now);

        let effects = session.apply(card_json("2", 80).into(), now);
        assert_eq!(
            effects,
            vec![
                Effect::CancelRemovalTimer,
                Effect::FetchBalance(snapshot("2", 80))
            ]
        );
        assert_eq!(
            session.view().state,
            SessionState::CardPresent(snapshot("2", 80))
        );
    }

    #[test]
    fn test_same_card_reinserted_does_not_refetch() {
        let mut session = connected_session();
        let now = Instant::now();
        session.apply(card_json("1", 30).into(), now);
        session.apply(null_msg().into(), now);
        let effects = session.apply(card_json("1", 25).into(), now);
        assert_eq!(effects, vec![Effect::CancelRemovalTimer]);
        assert_eq!(session.view().card().map(|c| c.credit), Some(Decimal::from(25)));
    }

    #[test]
    fn test_repeated_null_restarts_single_timer() {
        let mut session = connected_session();
        let start = Instant::now();
        session.apply(card_json("1", 30).into(), start);
        session.apply(null_msg().into(), start);

        let later = start + Duration::from_millis(2000);
        let effects = session.apply(null_msg().into(), later);
        assert_eq!(
            effects,
            vec![
                Effect::CancelRemovalTimer,
                Effect::StartRemovalTimer {
                    deadline: later + TIMEOUT
                }
            ]
        );

        // The first timer is stale now.
        let effects = session.apply(
            SessionEvent::RemovalElapsed {
                deadline: start + TIMEOUT,
            },
            start + TIMEOUT,
        );
        assert!(effects.is_empty());
        assert_eq!(session.view().card(), Some(&snapshot("1", 30)));
    }

    #[test]
    fn test_disconnect_during_pending_removal() {
        let mut session = connected_session();
        let now = Instant::now();
        session.apply(card_json("1", 30).into(), now);
        session.apply(null_msg().into(), now);

        let effects = session.apply(TransportEvent::Disconnected.into(), now);
        assert_eq!(
            effects,
            vec![Effect::CancelRemovalTimer, Effect::ClearBalance]
        );
        assert_eq!(session.view().state, SessionState::Connecting);
        assert_eq!(session.view().card(), None);

        let effects = session.apply(
            SessionEvent::RemovalElapsed {
                deadline: now + TIMEOUT,
            },
            now + TIMEOUT,
        );
        assert!(effects.is_empty());
        assert_eq!(session.view().state, SessionState::Connecting);

        session.apply(TransportEvent::Connected.into(), now + TIMEOUT);
        assert_eq!(session.view().state, SessionState::AwaitingCard);
    }

    #[test]
    fn test_transport_error_hides_card() {
        let mut session = connected_session();
        session.apply(card_json("1", 30).into(), Instant::now());
        let effects = session.apply(
            TransportEvent::Error("subscription rejected".to_string()).into(),
            Instant::now(),
        );
        assert_eq!(effects, vec![Effect::ClearBalance]);
        assert_eq!(
            session.view().state,
            SessionState::TransportError("subscription rejected".to_string())
        );

        session.apply(TransportEvent::Reconnecting.into(), Instant::now());
        assert!(matches!(
            session.view().state,
            SessionState::TransportError(_)
        ));
    }

    #[test]
    fn test_malformed_payload_keeps_state_and_timer() {
        let mut session = connected_session();
        let now = Instant::now();
        session.apply(card_json("1", 30).into(), now);
        session.apply(null_msg().into(), now);
        let before = session.view().state.clone();

        let effects = session.apply(
            TransportEvent::Message(Bytes::from_static(b"{garbage")).into(),
            now,
        );
        assert!(effects.is_empty());
        assert_eq!(session.view().state, before);
        assert_eq!(session.view().display_error.as_deref(), Some(INVALID_CARD_DATA));

        session.apply(card_json("1", 30).into(), now);
        assert_eq!(session.view().display_error, None);
    }

    #[test]
    fn test_null_without_card_stays_awaiting() {
        let mut session = connected_session();
        let effects = session.apply(null_msg().into(), Instant::now());
        assert!(effects.is_empty());
        assert_eq!(session.view().state, SessionState::AwaitingCard);
    }
}
