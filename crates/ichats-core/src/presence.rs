use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use ichats_models::gateway::EVENT_GET_ONLINE_USERS;

use crate::auth::Identity;
use crate::events::{EventSender, ServerEvent};

/// A live realtime connection and its outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub connection_id: String,
    pub identity: Identity,
    sender: EventSender,
}

impl ConnectionHandle {
    pub fn new(connection_id: String, identity: Identity, sender: EventSender) -> Self {
        Self {
            connection_id,
            identity,
            sender,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    /// Queue an event on this connection. Returns false once the connection
    /// has gone away.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

#[derive(Default)]
struct PresenceTable {
    /// user_id -> connection_id. Last connection wins.
    online: HashMap<String, String>,
    /// Every open connection, including ones whose user entry was taken over
    /// by a newer connection.
    connections: HashMap<String, ConnectionHandle>,
}

impl PresenceTable {
    fn online_ids_sorted(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.online.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn broadcast(&self) {
        let ids = self.online_ids_sorted();
        for handle in self.connections.values() {
            let view: Vec<&String> = ids.iter().filter(|id| *id != handle.user_id()).collect();
            if !handle.send(ServerEvent::typed(EVENT_GET_ONLINE_USERS, &view)) {
                tracing::debug!(
                    connection_id = %handle.connection_id,
                    "skipping presence update for closed connection"
                );
            }
        }
    }
}

/// In-memory map of who is reachable right now. Every mutation and the
/// broadcast that follows it happen under one lock, so no connection can
/// observe a stale online list after the table settles.
pub struct PresenceRegistry {
    table: Mutex<PresenceTable>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(PresenceTable::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PresenceTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the handle's user online, replacing any previous connection for
    /// that user, then broadcast. Returns the id of the connection that lost
    /// its presence entry, if any.
    pub fn register(&self, handle: ConnectionHandle) -> Option<String> {
        let mut table = self.lock();
        let user_id = handle.user_id().to_string();
        let connection_id = handle.connection_id.clone();
        table.connections.insert(connection_id.clone(), handle);
        let replaced = table
            .online
            .insert(user_id.clone(), connection_id.clone())
            .filter(|previous| *previous != connection_id);
        if let Some(previous) = &replaced {
            tracing::info!(
                user_id = %user_id,
                previous_connection = %previous,
                connection_id = %connection_id,
                "newer connection took over presence"
            );
        }
        table.broadcast();
        replaced
    }

    /// Drop a closed connection and take its user offline, then broadcast.
    /// No-op (returns false, no broadcast) when the user is already absent or
    /// a newer connection owns the entry, so duplicate or late disconnects
    /// cannot knock a successor offline.
    pub fn unregister(&self, user_id: &str, connection_id: &str) -> bool {
        let mut table = self.lock();
        table.connections.remove(connection_id);
        let owns_entry = table
            .online
            .get(user_id)
            .is_some_and(|current| current == connection_id);
        if !owns_entry {
            return false;
        }
        table.online.remove(user_id);
        table.broadcast();
        true
    }

    pub fn lookup(&self, user_id: &str) -> Option<String> {
        self.lock().online.get(user_id).cloned()
    }

    /// Queue an event on the connection currently registered for `user_id`.
    /// Returns false when the user is offline or the connection just closed.
    pub fn send_to_user(&self, user_id: &str, event: ServerEvent) -> bool {
        let table = self.lock();
        table
            .online
            .get(user_id)
            .and_then(|connection_id| table.connections.get(connection_id))
            .is_some_and(|handle| handle.send(event))
    }

    /// Online user ids, sorted, optionally excluding one user.
    pub fn online_user_ids(&self, exclude: Option<&str>) -> Vec<String> {
        let mut ids = self.lock().online_ids_sorted();
        if let Some(exclude) = exclude {
            ids.retain(|id| id != exclude);
        }
        ids
    }

    pub fn online_count(&self) -> usize {
        self.lock().online.len()
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{channel, EventReceiver};
    use serde_json::json;

    fn connect(registry: &PresenceRegistry, conn: &str, user: &str) -> EventReceiver {
        let (tx, rx) = channel();
        let identity = Identity {
            user_id: user.into(),
            username: format!("{user}-name"),
        };
        registry.register(ConnectionHandle::new(conn.into(), identity, tx));
        rx
    }

    fn last_online_list(rx: &mut EventReceiver) -> Option<serde_json::Value> {
        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            if event.event_type == EVENT_GET_ONLINE_USERS {
                last = Some(event.payload);
            }
        }
        last
    }

    #[test]
    fn broadcast_is_personalized() {
        let registry = PresenceRegistry::new();
        let mut a = connect(&registry, "c1", "u1");
        let mut b = connect(&registry, "c2", "u2");
        let mut c = connect(&registry, "c3", "u3");

        assert_eq!(last_online_list(&mut a), Some(json!(["u2", "u3"])));
        assert_eq!(last_online_list(&mut b), Some(json!(["u1", "u3"])));
        assert_eq!(last_online_list(&mut c), Some(json!(["u1", "u2"])));

        assert!(registry.unregister("u2", "c2"));
        assert_eq!(last_online_list(&mut a), Some(json!(["u3"])));
        assert_eq!(last_online_list(&mut c), Some(json!(["u1"])));
    }

    #[test]
    fn unregister_absent_user_is_silent() {
        let registry = PresenceRegistry::new();
        let mut a = connect(&registry, "c1", "u1");
        assert_eq!(last_online_list(&mut a), Some(json!([])));

        assert!(!registry.unregister("ghost", "c7"));
        assert_eq!(last_online_list(&mut a), None);

        // A second close event for the same connection changes nothing.
        let _b = connect(&registry, "c2", "u2");
        assert!(registry.unregister("u2", "c2"));
        last_online_list(&mut a);
        assert!(!registry.unregister("u2", "c2"));
        assert_eq!(last_online_list(&mut a), None);
    }

    #[test]
    fn last_connection_wins_and_stale_disconnect_is_ignored() {
        let registry = PresenceRegistry::new();
        let _old = connect(&registry, "c1", "u1");
        let mut observer = connect(&registry, "c9", "u9");
        let (tx, _new) = channel();
        let replaced = registry.register(ConnectionHandle::new(
            "c2".into(),
            Identity {
                user_id: "u1".into(),
                username: "u1-name".into(),
            },
            tx,
        ));
        assert_eq!(replaced.as_deref(), Some("c1"));
        assert_eq!(registry.lookup("u1").as_deref(), Some("c2"));
        last_online_list(&mut observer);

        // The evicted connection closing must not take u1 offline.
        assert!(!registry.unregister("u1", "c1"));
        assert!(registry.lookup("u1").is_some());
        assert_eq!(registry.connection_count(), 2);
        assert_eq!(last_online_list(&mut observer), None);

        assert!(registry.unregister("u1", "c2"));
        assert!(registry.lookup("u1").is_none());
        assert_eq!(last_online_list(&mut observer), Some(json!([])));
    }

    #[test]
    fn send_to_user_targets_current_connection() {
        let registry = PresenceRegistry::new();
        let mut rx = connect(&registry, "c1", "u1");
        while rx.try_recv().is_ok() {}

        assert!(registry.send_to_user("u1", ServerEvent::new("ping", json!(1))));
        assert!(!registry.send_to_user("u2", ServerEvent::new("ping", json!(1))));
        assert_eq!(rx.try_recv().unwrap().event_type, "ping");

        drop(rx);
        assert!(!registry.send_to_user("u1", ServerEvent::new("ping", json!(2))));
    }

    #[test]
    fn online_user_ids_can_exclude_caller() {
        let registry = PresenceRegistry::new();
        let _a = connect(&registry, "c1", "u2");
        let _b = connect(&registry, "c2", "u1");
        assert_eq!(registry.online_user_ids(None), vec!["u1", "u2"]);
        assert_eq!(registry.online_user_ids(Some("u1")), vec!["u2"]);
        assert_eq!(registry.online_count(), 2);
        assert_eq!(registry.connection_count(), 2);
    }
}
