use axum::{
    extract::{Path, Query, State},
    Json,
};
use ichats_core::{relay, AppState};
use ichats_models::message::Message;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::AuthUser;

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// Conversation history with one peer, oldest first. Reading history never
/// counts as delivery.
pub async fn get_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(peer_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    ichats_util::validation::validate_user_id(&peer_id)
        .map_err(|e| ApiError::BadRequest(format!("peer id: {e}")))?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let messages = state
        .store
        .conversation(auth.user_id(), &peer_id, limit)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadBody {
    pub message_ids: Vec<Value>,
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<MarkReadBody>,
) -> Result<Json<Value>, ApiError> {
    let ids = relay::parse_message_ids(&body.message_ids);
    if ids.is_empty() && !body.message_ids.is_empty() {
        return Err(ApiError::BadRequest("messageIds must be message ids".into()));
    }
    let updated = relay::acknowledge_read(&state, &auth.identity, &ids).await?;
    Ok(Json(json!({ "updated": updated })))
}
