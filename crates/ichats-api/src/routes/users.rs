use axum::{extract::State, Json};
use ichats_core::AppState;

use crate::middleware::AuthUser;

/// Same personalized view the realtime channel pushes as `getOnlineUsers`.
pub async fn online_users(State(state): State<AppState>, auth: AuthUser) -> Json<Vec<String>> {
    Json(state.presence.online_user_ids(Some(auth.user_id())))
}
