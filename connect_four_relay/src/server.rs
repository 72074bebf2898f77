// TCP listener, matchmaking, and the handle that controls a running relay.
//
// Architecture: thread-per-connection over shared, individually locked state.
//
// - **Accept thread** (`TcpListener::accept()` loop): wraps each new stream in
//   a `Connection`, runs matchmaking, then spawns that connection's thread.
//   The listener is non-blocking so the loop can notice `keep_running` going
//   false; it sleeps briefly on `WouldBlock`.
// - **Connection threads** (one per peer): run `Connection::run`, which
//   blocks on the next frame and forwards to the bound session or the lobby
//   rename path. Each thread tears its own connection down when the
//   transport closes.
//
// Matchmaking happens on the accept thread *before* the new connection's
// thread starts, so the newcomer cannot tear itself down mid-decision. The
// waiting side is covered by the pool lock (see `pool.rs`).
//
// Shutdown: `RelayHandle::stop` clears `keep_running`; the accept loop exits,
// disconnects every live connection (peers see `DISCONNECT:server`), and the
// handle joins it.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::Duration;

use connect_four_protocol::message::ServerMessage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::connection::Connection;
use crate::error::{RelayError, Result};
use crate::events::{EventSink, RelayEvent};
use crate::pool::Admission;
use crate::session::Session;
use crate::state::{RelayState, RelayStats};

/// How long the accept loop sleeps when no connection is pending.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Handle returned by `start_relay` to observe and control the server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    state: Arc<RelayState>,
    events: Option<Receiver<RelayEvent>>,
}

impl RelayHandle {
    /// Current counters. Safe to call from any thread at any time.
    pub fn stats(&self) -> RelayStats {
        self.state.stats()
    }

    /// Take the event receiver. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<Receiver<RelayEvent>> {
        self.events.take()
    }

    /// Shared state, for inspection in tests and monitors.
    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Bind the listener and start accepting on a background thread. Returns a
/// handle and the actual bound address (useful when port 0 is used to let
/// the OS pick a free port).
pub fn start_relay(config: RelayConfig) -> Result<(RelayHandle, SocketAddr)> {
    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(&listen_addr).map_err(|source| RelayError::Bind {
        addr: listen_addr.clone(),
        source,
    })?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let (sink, events) = EventSink::channel(config.event_capacity);
    let state = Arc::new(RelayState::new(config.reserved_names, sink));
    state
        .events
        .connection(format!("Server listening on port {}", addr.port()));

    let keep_running = Arc::new(AtomicBool::new(true));
    let thread = {
        let state = Arc::clone(&state);
        let keep_running = Arc::clone(&keep_running);
        thread::Builder::new()
            .name("relay-accept".into())
            .spawn(move || accept_loop(listener, state, keep_running))?
    };

    Ok((
        RelayHandle {
            keep_running,
            thread: Some(thread),
            state,
            events: Some(events),
        },
        addr,
    ))
}

fn accept_loop(listener: TcpListener, state: Arc<RelayState>, keep_running: Arc<AtomicBool>) {
    let mut rng = StdRng::from_entropy();

    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(false) {
                    warn!(%peer, "dropping connection: {e}");
                    continue;
                }
                handle_new_connection(&state, stream, peer, &mut rng);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                error!("accept failed: {e}");
                state
                    .events
                    .connection(format!("Server socket error: {e}"));
                break;
            }
        }
    }

    info!("relay stopping");
    state.disconnect_all();
}

/// Wrap a new stream, matchmake it, and start its receive thread.
fn handle_new_connection<R: Rng>(
    state: &Arc<RelayState>,
    stream: TcpStream,
    peer: SocketAddr,
    rng: &mut R,
) {
    let id = state.next_connection_id();
    let conn = match Connection::accept(id, stream, &state.names) {
        Ok(conn) => conn,
        Err(e) => {
            warn!(%peer, "could not set up connection #{id}: {e}");
            return;
        }
    };
    state.track(&conn);
    state.events.connection(format!(
        "Client #{id} connected with username {}",
        conn.name()
    ));
    debug!(%peer, conn = %id, "accepted");

    matchmake(state, &conn, rng);

    let spawned = {
        let state = Arc::clone(state);
        let conn = Arc::clone(&conn);
        thread::Builder::new()
            .name(format!("relay-conn-{id}"))
            .spawn(move || conn.run(&state))
    };
    if let Err(e) = spawned {
        error!(conn = %id, "could not spawn receive thread: {e}");
        conn.teardown(state);
    }
}

/// Enqueue `conn`, or pair it with the oldest waiting connection and start
/// the session.
pub fn matchmake<R: Rng>(state: &RelayState, conn: &Arc<Connection>, rng: &mut R) {
    let admission = state.pool.admit(Arc::clone(conn), |opponent, newcomer| {
        let session = Session::pair(state.next_session_id(), opponent, newcomer);
        state.sessions.insert(Arc::clone(&session));
        session
    });

    match admission {
        Admission::Waiting { queued } => {
            conn.send(&ServerMessage::Waiting);
            conn.send(&ServerMessage::UsernameAccepted { name: conn.name() });
            conn.send(&ServerMessage::UsernameList {
                names: state.names.snapshot(),
            });
            state.events.game(format!(
                "Client #{} waiting ({queued} in queue)",
                conn.id()
            ));
        }
        Admission::Paired(session) => {
            state.events.game(format!(
                "Starting session {} between {} and {}",
                session.id(),
                session.first().label(),
                session.second().label()
            ));
            session.start(state, rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;

    use connect_four_protocol::types::ConnectionId;

    use super::*;
    use crate::connection::test_support::{drain, recv, tcp_pair};

    fn relay() -> RelayState {
        RelayState::new(["Server", "Admin", "System"], EventSink::disabled())
    }

    fn arrive(state: &RelayState, rng: &mut StdRng) -> (Arc<Connection>, BufReader<TcpStream>) {
        let (client, server) = tcp_pair();
        let conn = Connection::accept(state.next_connection_id(), server, &state.names).unwrap();
        state.track(&conn);
        matchmake(state, &conn, rng);
        (conn, BufReader::new(client))
    }

    #[test]
    fn lone_arrival_waits_with_name_and_list() {
        let state = relay();
        let mut rng = StdRng::seed_from_u64(1);
        let (_a, mut ra) = arrive(&state, &mut rng);

        assert_eq!(
            drain(&mut ra),
            vec![
                ServerMessage::Connected { id: ConnectionId(1) },
                ServerMessage::Waiting,
                ServerMessage::UsernameAccepted {
                    name: "User1".into()
                },
                ServerMessage::UsernameList {
                    names: vec![
                        "Server".into(),
                        "Admin".into(),
                        "System".into(),
                        "User1".into()
                    ]
                },
            ]
        );
        assert_eq!(
            state.stats(),
            RelayStats {
                sessions: 0,
                waiting: 1,
                clients: 1
            }
        );
    }

    #[test]
    fn second_arrival_pairs_with_first() {
        let state = relay();
        let mut rng = StdRng::seed_from_u64(2);
        let (a, mut ra) = arrive(&state, &mut rng);
        let (b, mut rb) = arrive(&state, &mut rng);
        let a_messages = drain(&mut ra);
        assert!(a_messages.contains(&ServerMessage::OpponentName {
            name: "User2".into()
        }));

        assert_eq!(
            recv(&mut rb),
            ServerMessage::Connected { id: ConnectionId(2) }
        );
        assert_eq!(
            recv(&mut rb),
            ServerMessage::OpponentName {
                name: "User1".into()
            }
        );
        assert!(matches!(recv(&mut rb), ServerMessage::Turn { .. }));

        let session = a.session().expect("a is paired");
        assert_eq!(session.second().id(), b.id());
        assert_eq!(
            state.stats(),
            RelayStats {
                sessions: 1,
                waiting: 0,
                clients: 2
            }
        );
    }

    #[test]
    fn third_arrival_waits_again() {
        let state = relay();
        let mut rng = StdRng::seed_from_u64(3);
        let (_a, _ra) = arrive(&state, &mut rng);
        let (_b, _rb) = arrive(&state, &mut rng);
        let (c, _rc) = arrive(&state, &mut rng);
        assert_eq!(state.pool.ids(), vec![c.id()]);
        assert_eq!(state.stats().clients, 3);
    }

    #[test]
    fn start_relay_reports_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = RelayConfig {
            port: taken.local_addr().unwrap().port(),
            ..RelayConfig::default()
        };
        match start_relay(config) {
            Err(RelayError::Bind { .. }) => {}
            Err(other) => panic!("expected Bind error, got {other:?}"),
            Ok(_) => panic!("bind to an occupied port should fail"),
        }
    }

    #[test]
    fn handle_stops_cleanly_and_emits_listening_event() {
        let config = RelayConfig {
            port: 0,
            ..RelayConfig::default()
        };
        let (mut handle, addr) = start_relay(config).unwrap();
        let events = handle.take_events().unwrap();
        assert!(handle.take_events().is_none());

        let first = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            first,
            RelayEvent::Connection(format!("Server listening on port {}", addr.port()))
        );
        assert_eq!(handle.stats(), RelayStats::default());
        handle.stop();
    }
}
