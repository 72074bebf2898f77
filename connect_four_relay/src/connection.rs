// One accepted peer: its transport, display name, and receive loop.
//
// A `Connection` owns both halves of its `TcpStream`. The write half sits
// behind a `parking_lot::Mutex<BufWriter<_>>` so that the connection's own
// thread, its opponent's thread (relays) and any thread broadcasting public
// chat can all send without interleaving frames. The read half is taken once
// by `run`, which is the only reader.
//
// Lifecycle:
// - `accept` claims a default name (`User<id>`, suffixed if a player already
//   renamed themselves to it) and greets the peer with `CONNECTED:<id>`.
// - `run` blocks on the inbound `Frames` iterator. Before a session is bound
//   only `SET_USERNAME` and `PUBLIC_CHAT` are acted on; afterwards every
//   message goes to the session.
// - When the loop ends (EOF, I/O error, oversized or non-UTF-8 frame) the
//   connection is marked dead and `teardown` runs exactly once: either the
//   session's `player_left`, or removal from the waiting pool plus release of
//   the name.
//
// Writes are best effort. A failed write is logged at `debug` and otherwise
// ignored; the receive loop is the authority on whether the peer is gone.

use std::io::BufReader;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use connect_four_protocol::framing::{Frames, write_text};
use connect_four_protocol::message::{ClientMessage, DisconnectReason, ServerMessage};
use connect_four_protocol::types::{ConnectionId, SessionId};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::names::NameRegistry;
use crate::session::Session;
use crate::state::RelayState;

/// A peer that stops reading should not pin a relaying thread forever.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Connection {
    id: ConnectionId,
    name: Mutex<String>,
    stream: TcpStream,
    writer: Mutex<std::io::BufWriter<TcpStream>>,
    inbound: Mutex<Option<Frames<BufReader<TcpStream>>>>,
    session: Mutex<Option<Weak<Session>>>,
    alive: AtomicBool,
    torn_down: AtomicBool,
    disconnected: AtomicBool,
}

/// Where a rename request came from. In a session the opponent is told about
/// the new name; in the lobby the requester gets a fresh name list instead.
pub(crate) enum RenameScope<'a> {
    Lobby,
    Session {
        id: SessionId,
        opponent: &'a Connection,
    },
}

impl Connection {
    /// Wrap an accepted stream: claim a default name and send
    /// `CONNECTED:<id>`.
    pub fn accept(
        id: ConnectionId,
        stream: TcpStream,
        names: &NameRegistry,
    ) -> std::io::Result<Arc<Self>> {
        stream.set_nodelay(true).ok();
        stream.set_write_timeout(Some(WRITE_TIMEOUT)).ok();
        let writer = std::io::BufWriter::new(stream.try_clone()?);
        let reader = BufReader::new(stream.try_clone()?);
        let name = names.claim_unique(&format!("User{id}"));

        let conn = Arc::new(Self {
            id,
            name: Mutex::new(name),
            stream,
            writer: Mutex::new(writer),
            inbound: Mutex::new(Some(Frames::new(reader))),
            session: Mutex::new(None),
            alive: AtomicBool::new(true),
            torn_down: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
        });
        conn.send(&ServerMessage::Connected { id });
        Ok(conn)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    /// `Client #3 (Bob)`, the form used in events.
    pub fn label(&self) -> String {
        format!("Client #{} ({})", self.id, self.name.lock())
    }

    /// False once the receive loop has ended.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// The session this connection is bound to, if any.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn bind(&self, session: &Arc<Session>) {
        *self.session.lock() = Some(Arc::downgrade(session));
    }

    /// Clear the session slot if it still points at `session_id`.
    pub(crate) fn unbind(&self, session_id: SessionId) {
        let mut slot = self.session.lock();
        let stale = match slot.as_ref().and_then(Weak::upgrade) {
            Some(session) => session.id() == session_id,
            None => true,
        };
        if stale {
            *slot = None;
        }
    }

    /// Serialize and write one message. Failures are swallowed.
    pub fn send(&self, msg: &ServerMessage) {
        let text = msg.to_string();
        let mut writer = self.writer.lock();
        if let Err(e) = write_text(&mut *writer, &text) {
            debug!(conn = %self.id, "send {text:?} failed: {e}");
        }
    }

    /// Tell the peer the relay is closing the connection, then shut the
    /// transport down. Safe to call any number of times, from any thread.
    pub fn disconnect(&self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        self.send(&ServerMessage::Disconnect {
            reason: DisconnectReason::Server,
        });
        self.close_transport();
    }

    fn close_transport(&self) {
        // Wakes the receive loop if it is blocked in a read.
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    /// Receive loop. Blocks until the transport closes, then tears down.
    pub fn run(self: &Arc<Self>, relay: &RelayState) {
        let Some(frames) = self.inbound.lock().take() else {
            return;
        };

        for frame in frames {
            let line = match frame {
                Ok(line) => line,
                Err(e) => {
                    debug!(conn = %self.id, "receive loop ended: {e}");
                    break;
                }
            };
            relay
                .events
                .connection(format!("{} sent: {line}", self.label()));
            match line.parse::<ClientMessage>() {
                Ok(msg) => self.dispatch(relay, msg),
                Err(e) => warn!(conn = %self.id, "ignoring {line:?}: {e}"),
            }
        }

        self.mark_dead();
        relay
            .events
            .connection(format!("{} disconnected", self.label()));
        self.teardown(relay);
    }

    fn dispatch(&self, relay: &RelayState, msg: ClientMessage) {
        if let Some(session) = self.session() {
            session.relay(relay, self, msg);
            return;
        }
        match msg {
            ClientMessage::SetUsername { name } => {
                rename(relay, self, &name, RenameScope::Lobby);
            }
            ClientMessage::PublicChat { text } => relay.broadcast_public(self, &text),
            other => debug!(
                conn = %self.id,
                "ignoring {} outside a session",
                other.tag()
            ),
        }
    }

    /// Leave whatever this connection was part of. Runs at most once.
    pub(crate) fn teardown(&self, relay: &RelayState) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.mark_dead();
        // The peer is gone; there is nobody to notify.
        self.disconnected.store(true, Ordering::SeqCst);
        self.close_transport();
        relay.forget(self.id);

        match relay.pool.depart(self) {
            Some(session) => session.player_left(relay, self),
            None => relay.names.release(&self.name()),
        }
    }
}

/// Names travel comma-separated in `USERNAME_LIST`, so a comma would split
/// one name into two on every client.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(',')
}

/// Shared rename procedure for lobby and in-session requests. Returns whether
/// the rename happened.
pub(crate) fn rename(
    relay: &RelayState,
    conn: &Connection,
    proposed: &str,
    scope: RenameScope<'_>,
) -> bool {
    let old = {
        let mut current = conn.name.lock();
        if !is_valid_name(proposed) || !relay.names.rename(&current, proposed) {
            drop(current);
            conn.send(&ServerMessage::UsernameTaken {
                name: proposed.to_string(),
            });
            return false;
        }
        std::mem::replace(&mut *current, proposed.to_string())
    };

    conn.send(&ServerMessage::UsernameAccepted {
        name: proposed.to_string(),
    });
    match scope {
        RenameScope::Lobby => {
            conn.send(&ServerMessage::UsernameList {
                names: relay.names.snapshot(),
            });
            relay.events.connection(format!(
                "Client #{} changed username from {old} to {proposed}",
                conn.id
            ));
        }
        RenameScope::Session { id, opponent } => {
            opponent.send(&ServerMessage::OpponentRenamed {
                name: proposed.to_string(),
            });
            relay.events.game(format!(
                "Session {id}: Client #{} changed username from {old} to {proposed}",
                conn.id
            ));
        }
    }
    true
}


#[cfg(test)]
mod tests {
    use std::io::BufReader;

    use super::test_support::{drain, recv, tcp_pair};
    use super::*;
    use crate::events::EventSink;

    fn relay() -> RelayState {
        RelayState::new(["Server", "Admin", "System"], EventSink::disabled())
    }

    fn accept(relay: &RelayState) -> (Arc<Connection>, BufReader<TcpStream>) {
        let (client, server) = tcp_pair();
        let conn = Connection::accept(relay.next_connection_id(), server, &relay.names).unwrap();
        relay.track(&conn);
        (conn, BufReader::new(client))
    }

    #[test]
    fn accept_claims_default_name_and_greets() {
        let relay = relay();
        let (conn, mut client) = accept(&relay);
        assert_eq!(conn.id(), ConnectionId(1));
        assert_eq!(conn.name(), "User1");
        assert!(relay.names.contains("User1"));
        assert_eq!(
            recv(&mut client),
            ServerMessage::Connected { id: ConnectionId(1) }
        );
    }

    #[test]
    fn default_name_skips_a_name_taken_by_rename() {
        let relay = relay();
        assert!(relay.names.claim("User1"));
        let (conn, _client) = accept(&relay);
        assert_eq!(conn.name(), "User1_2");
    }

    #[test]
    fn lobby_rename_accepts_and_sends_list() {
        let relay = relay();
        let (conn, mut client) = accept(&relay);
        let _connected = recv(&mut client);

        assert!(rename(&relay, &conn, "Alice", RenameScope::Lobby));
        assert_eq!(conn.name(), "Alice");
        assert!(!relay.names.contains("User1"));
        assert_eq!(
            recv(&mut client),
            ServerMessage::UsernameAccepted {
                name: "Alice".into()
            }
        );
        assert_eq!(
            recv(&mut client),
            ServerMessage::UsernameList {
                names: vec![
                    "Server".into(),
                    "Admin".into(),
                    "System".into(),
                    "Alice".into()
                ]
            }
        );
    }

    #[test]
    fn rename_to_reserved_or_own_or_empty_name_is_taken() {
        let relay = relay();
        let (conn, mut client) = accept(&relay);
        let _connected = recv(&mut client);

        for proposed in ["Admin", "User1", ""] {
            assert!(!rename(&relay, &conn, proposed, RenameScope::Lobby));
            assert_eq!(
                recv(&mut client),
                ServerMessage::UsernameTaken {
                    name: proposed.into()
                }
            );
        }
        assert_eq!(conn.name(), "User1");
        assert!(relay.names.contains("User1"));
    }

    #[test]
    fn name_with_comma_is_refused_and_list_stays_parseable() {
        let relay = relay();
        let (conn, mut client) = accept(&relay);
        let _connected = recv(&mut client);

        assert!(!rename(&relay, &conn, "Ann,Bob", RenameScope::Lobby));
        assert_eq!(
            recv(&mut client),
            ServerMessage::UsernameTaken {
                name: "Ann,Bob".into()
            }
        );
        assert!(!relay.names.contains("Ann,Bob"));

        assert!(rename(&relay, &conn, "Ann", RenameScope::Lobby));
        let _accepted = recv(&mut client);
        let ServerMessage::UsernameList { names } = recv(&mut client) else {
            panic!("expected USERNAME_LIST");
        };
        assert_eq!(names.len(), relay.names.len());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let relay = relay();
        let (conn, mut client) = accept(&relay);
        let _connected = recv(&mut client);

        conn.disconnect();
        conn.disconnect();
        let messages = drain(&mut client);
        assert_eq!(
            messages,
            vec![ServerMessage::Disconnect {
                reason: DisconnectReason::Server
            }]
        );
    }

    #[test]
    fn waiting_connection_teardown_releases_name_and_slot_once() {
        let relay = relay();
        let (conn, _client) = accept(&relay);
        relay.pool.admit(Arc::clone(&conn), |_, _| unreachable!());
        assert_eq!(relay.pool.len(), 1);

        conn.teardown(&relay);
        assert_eq!(relay.pool.len(), 0);
        assert!(!relay.names.contains("User1"));

        // A second teardown must not release a name someone else now holds.
        assert!(relay.names.claim("User1"));
        conn.teardown(&relay);
        assert!(relay.names.contains("User1"));
    }

    #[test]
    fn receive_loop_ends_on_peer_close_and_tears_down() {
        let relay = relay();
        let (conn, client) = accept(&relay);
        relay.pool.admit(Arc::clone(&conn), |_, _| unreachable!());
        drop(client);

        conn.run(&relay);
        assert!(!conn.is_alive());
        assert_eq!(relay.pool.len(), 0);
        assert_eq!(relay.stats().clients, 0);
        assert!(!relay.names.contains("User1"));
    }
}
