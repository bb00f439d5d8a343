use ichats_models::call::{CallEvent, CallState};
use ichats_models::gateway::{
    AnswerCallRequest, AnswerRequest, CallAnswered, CallFailed, CallUserRequest, FromPeer,
    IceCandidateRequest, IncomingCall, OfferRequest, RelayedAnswer, RelayedIceCandidate,
    RelayedOffer, TargetRequest, EVENT_ANSWER, EVENT_ANSWER_CALL, EVENT_CALL_ANSWERED,
    EVENT_CALL_ENDED, EVENT_CALL_FAILED, EVENT_CALL_REJECTED, EVENT_CALL_USER, EVENT_END_CALL,
    EVENT_ICE_CANDIDATE, EVENT_INCOMING_CALL, EVENT_OFFER, EVENT_REJECT_CALL,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CoreError;
use crate::events::ServerEvent;
use crate::presence::{ConnectionHandle, PresenceRegistry};

pub const CALLEE_OFFLINE: &str = "User is offline";

/// What happened to a routed signaling event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Relayed,
    /// Target absent, nothing sent to anyone.
    Dropped,
}

/// Whether `event_type` is handled by [`route`].
pub fn is_signaling_event(event_type: &str) -> bool {
    matches!(
        event_type,
        EVENT_CALL_USER
            | EVENT_ANSWER_CALL
            | EVENT_REJECT_CALL
            | EVENT_END_CALL
            | EVENT_OFFER
            | EVENT_ANSWER
            | EVENT_ICE_CANDIDATE
    )
}

/// Call Signaling Router. Stateless: every event is forwarded to the
/// target's current connection with `from` rewritten to the sender.
///
/// An invite to an absent callee answers the caller with `callFailed` and
/// returns [`CoreError::TargetUnreachable`]; other events to absent targets
/// are dropped silently.
pub fn route(
    presence: &PresenceRegistry,
    origin: &ConnectionHandle,
    event_type: &str,
    payload: Value,
) -> Result<SignalOutcome, CoreError> {
    let from = origin.user_id().to_string();
    match event_type {
        EVENT_CALL_USER => {
            let req: CallUserRequest = parse(event_type, payload)?;
            let event = ServerEvent::typed(
                EVENT_INCOMING_CALL,
                &IncomingCall {
                    from: from.clone(),
                    from_username: origin.identity.username.clone(),
                    call_type: req.call_type,
                },
            );
            if forward(presence, &from, &req.to, event, CallEvent::Invite) {
                return Ok(SignalOutcome::Relayed);
            }
            log_transition(&from, &req.to, CallEvent::TargetAbsent);
            origin.send(ServerEvent::typed(
                EVENT_CALL_FAILED,
                &CallFailed {
                    message: CALLEE_OFFLINE.to_string(),
                },
            ));
            Err(CoreError::TargetUnreachable(req.to))
        }
        EVENT_ANSWER_CALL => {
            let req: AnswerCallRequest = parse(event_type, payload)?;
            let event = ServerEvent::typed(
                EVENT_CALL_ANSWERED,
                &CallAnswered {
                    from: from.clone(),
                    answer: req.answer,
                },
            );
            Ok(outcome(forward(presence, &from, &req.to, event, CallEvent::Accept)))
        }
        EVENT_REJECT_CALL => {
            let req: TargetRequest = parse(event_type, payload)?;
            let event = ServerEvent::typed(EVENT_CALL_REJECTED, &FromPeer { from: from.clone() });
            Ok(outcome(forward(presence, &from, &req.to, event, CallEvent::Reject)))
        }
        EVENT_END_CALL => {
            let req: TargetRequest = parse(event_type, payload)?;
            let event = ServerEvent::typed(EVENT_CALL_ENDED, &FromPeer { from: from.clone() });
            Ok(outcome(forward(presence, &from, &req.to, event, CallEvent::End)))
        }
        EVENT_OFFER => {
            let req: OfferRequest = parse(event_type, payload)?;
            let event = ServerEvent::typed(
                EVENT_OFFER,
                &RelayedOffer {
                    from: from.clone(),
                    offer: req.offer,
                },
            );
            Ok(outcome(relay_negotiation(presence, &from, &req.to, event)))
        }
        EVENT_ANSWER => {
            let req: AnswerRequest = parse(event_type, payload)?;
            let event = ServerEvent::typed(
                EVENT_ANSWER,
                &RelayedAnswer {
                    from: from.clone(),
                    answer: req.answer,
                },
            );
            Ok(outcome(relay_negotiation(presence, &from, &req.to, event)))
        }
        EVENT_ICE_CANDIDATE => {
            let req: IceCandidateRequest = parse(event_type, payload)?;
            let event = ServerEvent::typed(
                EVENT_ICE_CANDIDATE,
                &RelayedIceCandidate {
                    from: from.clone(),
                    candidate: req.candidate,
                },
            );
            Ok(outcome(relay_negotiation(presence, &from, &req.to, event)))
        }
        other => Err(CoreError::Malformed(format!("{other} is not a signaling event"))),
    }
}

fn parse<T: DeserializeOwned>(event_type: &str, payload: Value) -> Result<T, CoreError> {
    serde_json::from_value(payload).map_err(|e| CoreError::Malformed(format!("{event_type}: {e}")))
}

fn outcome(relayed: bool) -> SignalOutcome {
    if relayed {
        SignalOutcome::Relayed
    } else {
        SignalOutcome::Dropped
    }
}

/// Forward a lifecycle event, logging the transition it implies for the
/// two clients.
fn forward(
    presence: &PresenceRegistry,
    from: &str,
    to: &str,
    event: ServerEvent,
    transition: CallEvent,
) -> bool {
    if !presence.send_to_user(to, event) {
        tracing::debug!(from, to, event = ?transition, "call target not connected");
        return false;
    }
    log_transition(from, to, transition);
    true
}

fn log_transition(from: &str, to: &str, transition: CallEvent) {
    let (before, after) = match transition {
        CallEvent::Invite | CallEvent::TargetAbsent => (CallState::Idle, CallState::Idle.apply(transition)),
        CallEvent::Accept | CallEvent::Reject => (CallState::Ringing, CallState::Ringing.apply(transition)),
        CallEvent::End => (CallState::Active, CallState::Active.apply(transition)),
    };
    tracing::info!(
        from,
        to,
        from_state = before.as_str(),
        to_state = after.map(CallState::as_str).unwrap_or("invalid"),
        "call signal"
    );
}

fn relay_negotiation(presence: &PresenceRegistry, from: &str, to: &str, event: ServerEvent) -> bool {
    let event_type = event.event_type.clone();
    let relayed = presence.send_to_user(to, event);
    if relayed {
        tracing::trace!(from, to, event_type = %event_type, "negotiation relayed");
    } else {
        tracing::debug!(from, to, event_type = %event_type, "negotiation target not connected");
    }
    relayed
}
