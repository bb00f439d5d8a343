use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Audio,
    Video,
}

/// Lifecycle of one call attempt as tracked by each client.
///
/// The server never stores this; the signaling router only uses it to name
/// the transition an event implies when it logs the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Ringing,
    Active,
    Ended,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    Invite,
    TargetAbsent,
    Accept,
    Reject,
    End,
}

impl CallState {
    /// Returns the next state, or `None` if the event is not valid here.
    pub fn apply(self, event: CallEvent) -> Option<CallState> {
        use CallEvent::*;
        use CallState::*;
        match (self, event) {
            (Idle, Invite) => Some(Ringing),
            (Idle, TargetAbsent) | (Ringing, TargetAbsent) => Some(Failed),
            (Ringing, Accept) => Some(Active),
            (Ringing, Reject) => Some(Rejected),
            // The caller may hang up before the callee answers.
            (Ringing, End) | (Active, End) => Some(Ended),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Rejected | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ringing => "ringing",
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}
