use ichats_models::gateway::EVENT_RECEIVE_MESSAGE;

use crate::error::CoreError;
use crate::events::ServerEvent;
use crate::presence::ConnectionHandle;
use crate::AppState;

/// Offline Replay: stream every undelivered message for the caller, then
/// flip exactly those ids to delivered.
///
/// If the connection goes away mid-stream nothing is marked, so the whole
/// batch is offered again on the next request. Messages arriving while the
/// batch is streamed are not part of it and stay undelivered.
pub async fn replay_offline(state: &AppState, origin: &ConnectionHandle) -> Result<usize, CoreError> {
    let pending = state
        .store
        .find_undelivered(origin.user_id())
        .await
        .inspect_err(|e| {
            tracing::error!(user_id = %origin.user_id(), "failed to load offline messages: {}", e)
        })?;
    if pending.is_empty() {
        return Ok(0);
    }

    let mut ids = Vec::with_capacity(pending.len());
    for mut message in pending {
        ids.push(message.id);
        message.delivered = true;
        if !origin.send(ServerEvent::typed(EVENT_RECEIVE_MESSAGE, &message)) {
            tracing::debug!(user_id = %origin.user_id(), "connection closed during offline replay");
            return Ok(0);
        }
    }

    let updated = state
        .store
        .mark_delivered(&ids)
        .await
        .inspect_err(|e| {
            tracing::error!(user_id = %origin.user_id(), "failed to mark offline messages delivered: {}", e)
        })?;
    tracing::info!(user_id = %origin.user_id(), streamed = ids.len(), updated, "offline messages replayed");
    Ok(ids.len())
}
