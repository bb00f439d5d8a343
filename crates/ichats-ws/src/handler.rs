use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use ichats_core::auth::Identity;
use ichats_core::error::CoreError;
use ichats_core::events::{self, QueueDepthMonitor, ServerEvent};
use ichats_core::presence::ConnectionHandle;
use ichats_core::{relay, replay, signaling, AppState};
use ichats_models::gateway::*;
use tokio::time::{Duration, Instant};

use crate::session::Session;
use crate::ConnectionGuard;

const WIRE_PREVIEW_MAX_CHARS: usize = 512;

fn wire_trace_payload_preview(payload: &str) -> String {
    let mut chars = payload.chars();
    let preview: String = chars.by_ref().take(WIRE_PREVIEW_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{preview}...")
    } else {
        preview
    }
}

fn wire_log_ws_in(state: &AppState, session: &Session, payload: &str) {
    if !state.config.wire_trace {
        return;
    }
    tracing::info!(
        target: "wire",
        transport = "gateway_ws",
        direction = "in",
        user_id = %session.user_id(),
        connection_id = %session.connection_id,
        bytes = payload.len(),
        payload_preview = %wire_trace_payload_preview(payload),
        "server_in"
    );
}

fn wire_log_ws_out(state: &AppState, session: &Session, event_type: &str, payload: &str) {
    if !state.config.wire_trace {
        return;
    }
    tracing::info!(
        target: "wire",
        transport = "gateway_ws",
        direction = "out",
        user_id = %session.user_id(),
        connection_id = %session.connection_id,
        event_type,
        bytes = payload.len(),
        payload_preview = %wire_trace_payload_preview(payload),
        "server_out"
    );
}

pub(crate) async fn handle_connection(
    socket: WebSocket,
    state: AppState,
    identity: Identity,
    _guard: ConnectionGuard,
) {
    let mut session = Session::new(identity);
    let (event_tx, event_rx) = events::channel();
    let handle = ConnectionHandle::new(
        session.connection_id.clone(),
        session.identity.clone(),
        event_tx,
    );

    tracing::info!(
        user_id = %session.user_id(),
        username = %session.identity.username,
        connection_id = %session.connection_id,
        "Client connected"
    );
    state.presence.register(handle.clone());

    let (sender, receiver) = socket.split();
    let reason = run_session(sender, receiver, event_rx, &mut session, &handle, &state).await;

    state
        .presence
        .unregister(session.user_id(), &session.connection_id);
    tracing::info!(
        user_id = %session.user_id(),
        connection_id = %session.connection_id,
        frames_in = session.frames_in,
        frames_out = session.frames_out,
        duration_secs = session.connected_at.elapsed().as_secs(),
        open_connections = state.presence.connection_count(),
        reason = %reason,
        "Client disconnected"
    );
}

async fn run_session(
    mut sender: impl SinkExt<Message> + Unpin,
    mut receiver: impl StreamExt<Item = Result<Message, axum::Error>> + Unpin,
    mut event_rx: events::EventReceiver,
    session: &mut Session,
    handle: &ConnectionHandle,
    state: &AppState,
) -> String {
    let mut ws_ping_interval =
        tokio::time::interval(Duration::from_secs(state.config.ping_interval_seconds.max(1)));
    ws_ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ws_ping_interval.tick().await; // skip immediate first tick

    // Any inbound frame, pongs included, proves the peer is still reading.
    let heartbeat_timeout = Duration::from_secs(state.config.heartbeat_timeout_seconds.max(1));
    let heartbeat_sleep = tokio::time::sleep(heartbeat_timeout);
    tokio::pin!(heartbeat_sleep);
    let mut queue_depth = QueueDepthMonitor::default();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                if matches!(msg, Some(Ok(_))) {
                    heartbeat_sleep.as_mut().reset(Instant::now() + heartbeat_timeout);
                }
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        session.frames_in += 1;
                        wire_log_ws_in(state, session, &text);
                        dispatch(state, handle, &text).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!(connection_id = %session.connection_id, "ignoring binary frame");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return match frame {
                            Some(frame) => format!(
                                "client close frame (code={}, reason={})",
                                frame.code, frame.reason
                            ),
                            None => "client close frame (no code/reason)".to_string(),
                        };
                    }
                    // Pings are answered by axum; pongs need no action.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return format!("websocket receive error: {err}"),
                    None => return "websocket stream ended".to_string(),
                }
            }
            event = event_rx.recv() => {
                // The handle keeps one sender alive, so the queue never closes here.
                let Some(event) = event else {
                    return "event queue closed".to_string();
                };
                let depth = event_rx.len();
                if queue_depth.observe(depth) {
                    tracing::warn!(
                        user_id = %session.user_id(),
                        connection_id = %session.connection_id,
                        depth,
                        "outbound queue backlogged; client is reading slowly"
                    );
                }
                let event_type = event.event_type.clone();
                let payload = match serde_json::to_string(&event.into_frame()) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::error!(event_type = %event_type, "failed to encode frame: {}", e);
                        continue;
                    }
                };
                session.frames_out += 1;
                wire_log_ws_out(state, session, &event_type, &payload);
                if sender.send(Message::Text(payload.into())).await.is_err() {
                    return "websocket send error".to_string();
                }
            }
            _ = ws_ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return "websocket ping send error".to_string();
                }
            }
            () = &mut heartbeat_sleep => {
                return format!("heartbeat timeout after {}s", heartbeat_timeout.as_secs());
            }
        }
    }
}

/// Handle one inbound frame to completion before the next is read, which
/// keeps each connection's events in order.
async fn dispatch(state: &AppState, handle: &ConnectionHandle, text: &str) {
    let frame: GatewayMessage = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(user_id = %handle.user_id(), "dropping unparseable frame: {}", e);
            return;
        }
    };

    match frame.t.as_str() {
        EVENT_SEND_MESSAGE => match serde_json::from_value::<SendMessageRequest>(frame.d) {
            Ok(request) => {
                if let Err(e) = relay::send_message(state, handle, request).await {
                    tracing::debug!(user_id = %handle.user_id(), "sendMessage not accepted: {}", e);
                }
            }
            Err(e) => {
                tracing::debug!(user_id = %handle.user_id(), "malformed sendMessage: {}", e);
                handle.send(ServerEvent::typed(
                    EVENT_MESSAGE_ERROR,
                    &MessageError {
                        error: "Invalid message payload".to_string(),
                    },
                ));
            }
        },
        EVENT_REQUEST_OFFLINE_MESSAGES => {
            if let Err(e) = replay::replay_offline(state, handle).await {
                tracing::warn!(user_id = %handle.user_id(), "offline replay failed: {}", e);
            }
        }
        EVENT_MARK_READ => match serde_json::from_value::<MarkReadRequest>(frame.d) {
            Ok(request) => {
                let ids = relay::parse_message_ids(&request.message_ids);
                if let Err(e) = relay::acknowledge_read(state, &handle.identity, &ids).await {
                    tracing::warn!(user_id = %handle.user_id(), "markRead failed: {}", e);
                }
            }
            Err(e) => {
                tracing::debug!(user_id = %handle.user_id(), "malformed markRead: {}", e);
            }
        },
        event_type if signaling::is_signaling_event(event_type) => {
            match signaling::route(&state.presence, handle, event_type, frame.d) {
                Ok(_) => {}
                Err(CoreError::TargetUnreachable(to)) => {
                    tracing::debug!(user_id = %handle.user_id(), to = %to, "call invite to offline user");
                }
                Err(e) => {
                    tracing::debug!(user_id = %handle.user_id(), "dropping signal: {}", e);
                }
            }
        }
        other => {
            tracing::debug!(user_id = %handle.user_id(), event_type = other, "ignoring unknown event");
        }
    }
}
