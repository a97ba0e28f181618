use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::realtime::events::ServerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

struct ConnEntry {
    tx: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct HubInner {
    next_conn_id: u64,
    conns: HashMap<ConnId, ConnEntry>,
    rooms: HashMap<String, HashSet<ConnId>>,
}

/// In-process room registry. Membership lives only as long as the
/// connection; emits are fire-and-forget and never block on a slow
/// subscriber (each connection drains its own unbounded queue).
///
/// The lock is never held across an await point.
#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<Mutex<HubInner>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner::default())),
        }
    }

    /// Registers a connection and hands back its event queue.
    pub fn register(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        inner.next_conn_id += 1;
        let conn = ConnId(inner.next_conn_id);
        inner.conns.insert(
            conn,
            ConnEntry {
                tx,
                rooms: HashSet::new(),
            },
        );
        (conn, rx)
    }

    /// Drops the connection and every room membership it held.
    pub fn unregister(&self, conn: ConnId) {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        if let Some(entry) = inner.conns.remove(&conn) {
            for room in entry.rooms {
                remove_from_room(&mut inner.rooms, &room, conn);
            }
        }
    }

    pub fn join(&self, conn: ConnId, room: &str) {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        let Some(entry) = inner.conns.get_mut(&conn) else {
            return;
        };
        entry.rooms.insert(room.to_string());
        inner.rooms.entry(room.to_string()).or_default().insert(conn);
    }

    pub fn leave(&self, conn: ConnId, room: &str) {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        if let Some(entry) = inner.conns.get_mut(&conn) {
            entry.rooms.remove(room);
        }
        remove_from_room(&mut inner.rooms, room, conn);
    }

    /// Queues `event` for every member of `room`; returns how many
    /// connections it was handed to. Members whose queue is gone are
    /// pruned on the way.
    pub fn emit_to_room(&self, room: &str, event: ServerEvent) -> usize {
        self.emit(room, None, event)
    }

    /// Same as `emit_to_room` but skips the sender's own connection.
    pub fn emit_to_room_except(&self, room: &str, except: ConnId, event: ServerEvent) -> usize {
        self.emit(room, Some(except), event)
    }

    /// Direct event to one connection; false if it is already gone.
    pub fn send_to(&self, conn: ConnId, event: ServerEvent) -> bool {
        let inner = self.inner.lock().expect("hub lock poisoned");
        match inner.conns.get(&conn) {
            Some(entry) => entry.tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn room_size(&self, room: &str) -> usize {
        let inner = self.inner.lock().expect("hub lock poisoned");
        inner.rooms.get(room).map(HashSet::len).unwrap_or(0)
    }

    fn emit(&self, room: &str, except: Option<ConnId>, event: ServerEvent) -> usize {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        let Some(members) = inner.rooms.get(room) else {
            return 0;
        };

        let targets: Vec<ConnId> = members
            .iter()
            .copied()
            .filter(|conn| Some(*conn) != except)
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for conn in targets {
            match inner.conns.get(&conn) {
                Some(entry) if entry.tx.send(event.clone()).is_ok() => delivered += 1,
                _ => dead.push(conn),
            }
        }

        for conn in dead {
            tracing::debug!(room, conn = ?conn, "dropping dead connection from room");
            if let Some(entry) = inner.conns.remove(&conn) {
                for joined in entry.rooms {
                    remove_from_room(&mut inner.rooms, &joined, conn);
                }
            } else {
                remove_from_room(&mut inner.rooms, room, conn);
            }
        }

        delivered
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_from_room(rooms: &mut HashMap<String, HashSet<ConnId>>, room: &str, conn: ConnId) {
    if let Some(members) = rooms.get_mut(room) {
        members.remove(&conn);
        if members.is_empty() {
            rooms.remove(room);
        }
    }
}
