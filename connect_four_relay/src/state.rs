// Shared relay state: everything connection threads and the accept loop
// touch.
//
// `RelayState` is created once per server and shared as `Arc<RelayState>`.
// Each component keeps its own lock (see `names.rs`, `pool.rs`,
// `session.rs`); this struct only adds the live-connection table, the ID
// counters, and the derived stats.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use connect_four_protocol::message::ServerMessage;
use connect_four_protocol::types::{ConnectionId, SessionId};
use parking_lot::Mutex;

use crate::connection::Connection;
use crate::events::EventSink;
use crate::names::NameRegistry;
use crate::pool::WaitingPool;
use crate::session::LiveSessions;

/// Counters for an external monitor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Sessions in play.
    pub sessions: usize,
    /// Connections in the waiting pool.
    pub waiting: usize,
    /// `2 * sessions + waiting`. Session-less survivors are not counted.
    pub clients: usize,
}

pub struct RelayState {
    pub names: NameRegistry,
    pub pool: WaitingPool,
    pub sessions: LiveSessions,
    pub events: EventSink,
    connections: Mutex<BTreeMap<ConnectionId, Arc<Connection>>>,
    next_connection_id: AtomicU32,
    next_session_id: AtomicU32,
}

impl RelayState {
    pub fn new<I, S>(reserved_names: I, events: EventSink) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: NameRegistry::new(reserved_names),
            pool: WaitingPool::new(),
            sessions: LiveSessions::new(),
            events,
            connections: Mutex::new(BTreeMap::new()),
            next_connection_id: AtomicU32::new(1),
            next_session_id: AtomicU32::new(1),
        }
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn next_session_id(&self) -> SessionId {
        SessionId(self.next_session_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Add a connection to the live table.
    pub fn track(&self, conn: &Arc<Connection>) {
        self.connections.lock().insert(conn.id(), Arc::clone(conn));
    }

    /// Drop a connection from the live table.
    pub fn forget(&self, id: ConnectionId) {
        self.connections.lock().remove(&id);
    }

    pub fn live_connections(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().values().cloned().collect()
    }

    /// Send `PUBLIC_CHAT:<sender>:<text>` to every live connection,
    /// the sender included.
    pub fn broadcast_public(&self, from: &Connection, text: &str) {
        let msg = ServerMessage::PublicChat {
            from: from.name(),
            text: text.to_string(),
        };
        for conn in self.live_connections() {
            conn.send(&msg);
        }
    }

    /// Send `DISCONNECT:server` to every live connection and close them. Each
    /// connection's own thread then runs its teardown.
    pub fn disconnect_all(&self) {
        for conn in self.live_connections() {
            conn.disconnect();
        }
    }

    pub fn stats(&self) -> RelayStats {
        let sessions = self.sessions.len();
        let waiting = self.pool.len();
        RelayStats {
            sessions,
            waiting,
            clients: sessions * 2 + waiting,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;

    use super::*;
    use crate::connection::test_support::{drain, recv, tcp_pair};

    #[test]
    fn ids_start_at_one_and_increase() {
        let relay = RelayState::new(["Server"], EventSink::disabled());
        assert_eq!(relay.next_connection_id(), ConnectionId(1));
        assert_eq!(relay.next_connection_id(), ConnectionId(2));
        assert_eq!(relay.next_session_id(), SessionId(1));
    }

    #[test]
    fn empty_relay_has_zero_stats() {
        let relay = RelayState::new(["Server"], EventSink::disabled());
        assert_eq!(relay.stats(), RelayStats::default());
    }

    #[test]
    fn public_chat_reaches_everyone_including_sender() {
        let relay = RelayState::new(["Server"], EventSink::disabled());
        let mut readers = Vec::new();
        let mut conns = Vec::new();
        for _ in 0..3 {
            let (client, server) = tcp_pair();
            let conn =
                Connection::accept(relay.next_connection_id(), server, &relay.names).unwrap();
            relay.track(&conn);
            let mut reader = BufReader::new(client);
            let _connected = recv(&mut reader);
            readers.push(reader);
            conns.push(conn);
        }

        relay.broadcast_public(&conns[1], "anyone: up for a game?");
        let expected = ServerMessage::PublicChat {
            from: "User2".into(),
            text: "anyone: up for a game?".into(),
        };
        for reader in &mut readers {
            assert_eq!(drain(reader), vec![expected.clone()]);
        }

        relay.forget(conns[0].id());
        assert_eq!(relay.live_connections().len(), 2);
    }
}
