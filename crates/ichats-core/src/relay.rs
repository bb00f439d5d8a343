use chrono::{DateTime, TimeZone, Utc};
use ichats_models::gateway::{
    MessageError, SendMessageRequest, EVENT_MESSAGE_ERROR, EVENT_RECEIVE_MESSAGE,
};
use ichats_models::message::{Message, MessageKind, NewMessage};
use ichats_util::validation;
use serde_json::Value;

use crate::auth::Identity;
use crate::error::CoreError;
use crate::events::ServerEvent;
use crate::presence::ConnectionHandle;
use crate::AppState;

const SEND_FAILED: &str = "Failed to send message";

/// Turn a raw `sendMessage` payload into a message ready for persistence.
///
/// `recipientId` and `content` are required in both modes. In lenient mode
/// every other field falls back to a default when missing or mistyped; in
/// strict mode anything present but invalid is rejected.
pub fn normalize_send_request(
    request: SendMessageRequest,
    sender: &Identity,
    strict: bool,
    now: DateTime<Utc>,
) -> Result<NewMessage, CoreError> {
    let recipient_id = match request.recipient_id {
        Some(Value::String(id)) if validation::validate_user_id(&id).is_ok() => id,
        Some(Value::Number(n)) if !strict => n.to_string(),
        _ => return Err(CoreError::Malformed("recipientId is required".into())),
    };

    let content = match request.content {
        Some(Value::String(content)) => content,
        Some(Value::Number(n)) if !strict => n.to_string(),
        Some(Value::Bool(b)) if !strict => b.to_string(),
        _ => return Err(CoreError::Malformed("content is required".into())),
    };
    if strict {
        validation::validate_message_content(&content)
            .map_err(|e| CoreError::Malformed(format!("content: {e}")))?;
    }

    let raw_kind = match request.kind {
        None | Some(Value::Null) => request.legacy_type,
        explicit => explicit,
    };
    let kind = match raw_kind {
        None | Some(Value::Null) => MessageKind::Text,
        Some(Value::String(raw)) => match MessageKind::parse(&raw) {
            Some(kind) => kind,
            None if strict => return Err(CoreError::Malformed(format!("unknown kind {raw:?}"))),
            None => MessageKind::Text,
        },
        Some(_) if strict => return Err(CoreError::Malformed("kind must be a string".into())),
        Some(_) => MessageKind::Text,
    };

    let timestamp = match request.timestamp {
        None | Some(Value::Null) => now,
        Some(raw) => match parse_timestamp(&raw) {
            Some(ts) => ts,
            None if strict => return Err(CoreError::Malformed("unparseable timestamp".into())),
            None => now,
        },
    };

    let file_name = optional_string(request.file_name, "fileName", strict)?;
    let file_type = optional_string(request.file_type, "fileType", strict)?;
    let file_size = match request.file_size {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_i64() {
            Some(size) => Some(size),
            None if strict => return Err(CoreError::Malformed("fileSize must be an integer".into())),
            None => None,
        },
        Some(_) if strict => return Err(CoreError::Malformed("fileSize must be a number".into())),
        Some(_) => None,
    };

    if strict {
        if kind.has_attachment() {
            let name = file_name
                .as_deref()
                .ok_or_else(|| CoreError::Malformed(format!("{} message requires fileName", kind.as_str())))?;
            validation::validate_file_name(name)
                .map_err(|e| CoreError::Malformed(format!("fileName: {e}")))?;
        }
        if let Some(size) = file_size {
            validation::validate_file_size(size)
                .map_err(|e| CoreError::Malformed(format!("fileSize: {e}")))?;
        }
    }

    Ok(NewMessage {
        sender_id: sender.user_id.clone(),
        sender_username: sender.username.clone(),
        recipient_id,
        content,
        kind,
        file_name,
        file_type,
        file_size,
        timestamp,
        delivered: false,
    })
}

fn optional_string(value: Option<Value>, field: &str, strict: bool) -> Result<Option<String>, CoreError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) if strict => Err(CoreError::Malformed(format!("{field} must be a string"))),
        Some(_) => Ok(None),
    }
}

/// Accepts RFC 3339 strings and epoch milliseconds.
fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn message_error(error: &str) -> ServerEvent {
    ServerEvent::typed(
        EVENT_MESSAGE_ERROR,
        &MessageError {
            error: error.to_string(),
        },
    )
}

/// Message Relay: persist first, echo to the sender, then push to the
/// recipient when they were online at lookup time.
///
/// Any failure is reported to the sender alone with `messageError`; the
/// message is then considered not sent.
pub async fn send_message(
    state: &AppState,
    origin: &ConnectionHandle,
    request: SendMessageRequest,
) -> Result<Message, CoreError> {
    let mut draft = match normalize_send_request(
        request,
        &origin.identity,
        state.config.strict_payloads,
        Utc::now(),
    ) {
        Ok(draft) => draft,
        Err(e) => {
            tracing::debug!(sender = %origin.user_id(), "rejected sendMessage: {}", e);
            origin.send(message_error(&e.to_string()));
            return Err(e);
        }
    };

    draft.delivered = state.presence.lookup(&draft.recipient_id).is_some();
    let delivered = draft.delivered;

    let message = match state.store.append(draft).await {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(sender = %origin.user_id(), "failed to persist message: {}", e);
            origin.send(message_error(SEND_FAILED));
            return Err(CoreError::Persistence(e));
        }
    };

    let event = ServerEvent::typed(EVENT_RECEIVE_MESSAGE, &message);
    if !origin.send(event.clone()) {
        tracing::debug!(message_id = message.id, "sender left before the echo was queued");
    }

    // A message to oneself is already covered by the echo.
    if delivered
        && message.recipient_id != origin.user_id()
        && !state.presence.send_to_user(&message.recipient_id, event)
    {
        tracing::warn!(
            message_id = message.id,
            recipient = %message.recipient_id,
            "recipient went offline before push; message stays flagged delivered"
        );
    }

    tracing::info!(
        message_id = message.id,
        sender = %message.sender_id,
        recipient = %message.recipient_id,
        kind = message.kind.as_str(),
        delivered,
        "message relayed"
    );
    Ok(message)
}

/// Parse client supplied message ids, which arrive as strings or numbers.
/// Anything else is skipped.
pub fn parse_message_ids(raw: &[Value]) -> Vec<i64> {
    raw.iter()
        .filter_map(|v| match v {
            Value::String(s) => s.parse::<i64>().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        })
        .collect()
}

/// Read acknowledgement. Only messages addressed to `reader` are flipped.
pub async fn acknowledge_read(
    state: &AppState,
    reader: &Identity,
    ids: &[i64],
) -> Result<u64, CoreError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let updated = state.store.mark_read(&reader.user_id, ids).await?;
    tracing::debug!(reader = %reader.user_id, requested = ids.len(), updated, "messages marked read");
    Ok(updated)
}
