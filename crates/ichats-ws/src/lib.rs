mod handler;
mod session;

use std::sync::atomic::Ordering as AtomicOrdering;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use ichats_core::{auth, AppState};
use serde::Deserialize;
use serde_json::json;

pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/socket", get(ws_upgrade))
}

#[derive(Debug, Default, Deserialize)]
struct HandshakeQuery {
    token: Option<String>,
}

/// Connection Gate. The credential is checked before the upgrade so a
/// rejected client never gets a socket or a presence entry.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HandshakeQuery>,
) -> Response {
    let token = bearer_token(&headers).or(query.token).unwrap_or_default();
    let identity = match auth::verify_identity(&token, &state.config.jwt_secret) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::info!("Rejected gateway handshake: {}", e);
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized", "message": e.to_string() })),
            )
                .into_response();
        }
    };

    let Some(guard) = ConnectionGuard::acquire(&state) else {
        tracing::warn!(
            user_id = %identity.user_id,
            max = state.config.max_connections,
            "Gateway connection cap reached"
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "unavailable", "message": "Too many connections" })),
        )
            .into_response();
    };

    ws.on_upgrade(move |socket| handler::handle_connection(socket, state, identity, guard))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Holds one slot of the global connection cap until dropped.
pub(crate) struct ConnectionGuard {
    state: AppState,
}

impl ConnectionGuard {
    fn acquire(state: &AppState) -> Option<Self> {
        let counter = &state.gateway_connections;
        let mut current = counter.load(AtomicOrdering::SeqCst);
        loop {
            if current >= state.config.max_connections {
                return None;
            }
            match counter.compare_exchange(
                current,
                current + 1,
                AtomicOrdering::SeqCst,
                AtomicOrdering::SeqCst,
            ) {
                Ok(_) => {
                    return Some(Self {
                        state: state.clone(),
                    })
                }
                Err(observed) => current = observed,
            }
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state
            .gateway_connections
            .fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));
    }
}
