use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::call::CallType;

/// Envelope for every realtime frame in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub t: String,
    #[serde(default)]
    pub d: Value,
}

impl GatewayMessage {
    pub fn new(event_type: &str, payload: Value) -> Self {
        Self {
            t: event_type.to_string(),
            d: payload,
        }
    }
}

// Client -> Server events
pub const EVENT_SEND_MESSAGE: &str = "sendMessage";
pub const EVENT_REQUEST_OFFLINE_MESSAGES: &str = "requestOfflineMessages";
pub const EVENT_MARK_READ: &str = "markRead";
pub const EVENT_CALL_USER: &str = "callUser";
pub const EVENT_ANSWER_CALL: &str = "answerCall";
pub const EVENT_REJECT_CALL: &str = "rejectCall";
pub const EVENT_END_CALL: &str = "endCall";

// Server -> Client events
pub const EVENT_RECEIVE_MESSAGE: &str = "receiveMessage";
pub const EVENT_MESSAGE_ERROR: &str = "messageError";
pub const EVENT_GET_ONLINE_USERS: &str = "getOnlineUsers";
pub const EVENT_INCOMING_CALL: &str = "incomingCall";
pub const EVENT_CALL_FAILED: &str = "callFailed";
pub const EVENT_CALL_ANSWERED: &str = "callAnswered";
pub const EVENT_CALL_REJECTED: &str = "callRejected";
pub const EVENT_CALL_ENDED: &str = "callEnded";

// Negotiation events keep the same name in both directions
pub const EVENT_OFFER: &str = "offer";
pub const EVENT_ANSWER: &str = "answer";
pub const EVENT_ICE_CANDIDATE: &str = "iceCandidate";

/// Raw `sendMessage` payload. Every field is optional here; how missing or
/// mistyped values are treated depends on the configured strictness.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub recipient_id: Option<Value>,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub kind: Option<Value>,
    /// Older clients send the kind as `type`. Used only when `kind` is absent.
    #[serde(default, rename = "type")]
    pub legacy_type: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub file_name: Option<Value>,
    #[serde(default)]
    pub file_type: Option<Value>,
    #[serde(default)]
    pub file_size: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub message_ids: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageError {
    pub error: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallUserRequest {
    pub to: String,
    pub call_type: CallType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetRequest {
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerCallRequest {
    pub to: String,
    #[serde(default)]
    pub answer: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfferRequest {
    pub to: String,
    pub offer: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerRequest {
    pub to: String,
    pub answer: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IceCandidateRequest {
    pub to: String,
    pub candidate: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCall {
    pub from: String,
    pub from_username: String,
    pub call_type: CallType,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallFailed {
    pub message: String,
}

/// `callRejected` / `callEnded` payload.
#[derive(Debug, Clone, Serialize)]
pub struct FromPeer {
    pub from: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallAnswered {
    pub from: String,
    pub answer: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayedOffer {
    pub from: String,
    pub offer: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayedAnswer {
    pub from: String,
    pub answer: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayedIceCandidate {
    pub from: String,
    pub candidate: Value,
}
