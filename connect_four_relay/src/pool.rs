// Waiting pool: FIFO queue of connections with no opponent yet.
//
// All matchmaking decisions run under the pool's single lock:
// `admit` sweeps dead entries, then either enqueues the newcomer or pops the
// oldest waiter and hands both to a pairing closure that binds them into a
// session before the lock is released. `depart` (called from a connection's
// teardown) takes the same lock to decide between "still waiting, leave the
// queue" and "already bound, let the session handle it". A connection being
// torn down can therefore never be paired, and a paired connection never
// leaves without its session noticing.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::connection::Connection;
use crate::session::Session;

/// Outcome of admitting a new connection.
pub enum Admission {
    /// Queued; `queued` is the pool size including the newcomer.
    Waiting { queued: usize },
    /// Paired with the oldest waiter.
    Paired(Arc<Session>),
}

#[derive(Default)]
pub struct WaitingPool {
    queue: Mutex<VecDeque<Arc<Connection>>>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matchmake `newcomer`. `pair` receives `(oldest waiter, newcomer)` and
    /// runs under the pool lock.
    pub fn admit<F>(&self, newcomer: Arc<Connection>, pair: F) -> Admission
    where
        F: FnOnce(Arc<Connection>, Arc<Connection>) -> Arc<Session>,
    {
        let mut queue = self.queue.lock();
        let swept = sweep(&mut queue);
        if swept > 0 {
            debug!("swept {swept} dead connection(s) from the waiting pool");
        }

        match queue.pop_front() {
            None => {
                queue.push_back(newcomer);
                Admission::Waiting {
                    queued: queue.len(),
                }
            }
            Some(opponent) => Admission::Paired(pair(opponent, newcomer)),
        }
    }

    /// Called from teardown. Returns the bound session if there is one;
    /// otherwise removes `conn` from the queue.
    pub fn depart(&self, conn: &Connection) -> Option<Arc<Session>> {
        let mut queue = self.queue.lock();
        if let Some(session) = conn.session() {
            return Some(session);
        }
        queue.retain(|c| c.id() != conn.id());
        None
    }

    /// Queued IDs, oldest first.
    #[cfg(test)]
    pub(crate) fn ids(&self) -> Vec<connect_four_protocol::types::ConnectionId> {
        self.queue.lock().iter().map(|c| c.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

fn sweep(queue: &mut VecDeque<Arc<Connection>>) -> usize {
    let before = queue.len();
    queue.retain(|c| c.is_alive());
    before - queue.len()
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;
    use std::net::TcpStream;

    use connect_four_protocol::types::SessionId;

    use super::*;
    use crate::connection::test_support::tcp_pair;
    use crate::events::EventSink;
    use crate::state::RelayState;

    fn relay() -> RelayState {
        RelayState::new(["Server", "Admin", "System"], EventSink::disabled())
    }

    fn connect(relay: &RelayState) -> (Arc<Connection>, BufReader<TcpStream>) {
        let (client, server) = tcp_pair();
        let conn = Connection::accept(relay.next_connection_id(), server, &relay.names).unwrap();
        (conn, BufReader::new(client))
    }

    fn pair_into(relay: &RelayState) -> impl FnOnce(Arc<Connection>, Arc<Connection>) -> Arc<Session> {
        let id = relay.next_session_id();
        move |a, b| Session::pair(id, a, b)
    }

    #[test]
    fn first_arrival_waits() {
        let relay = relay();
        let (a, _ca) = connect(&relay);
        let outcome = relay.pool.admit(Arc::clone(&a), pair_into(&relay));
        assert!(matches!(outcome, Admission::Waiting { queued: 1 }));
        assert_eq!(relay.pool.ids(), vec![a.id()]);
    }

    #[test]
    fn pairs_with_oldest_waiter_fifo() {
        let relay = relay();
        let (a, _ca) = connect(&relay);
        let (b, _cb) = connect(&relay);
        let (c, _cc) = connect(&relay);

        // Seed the queue with two waiters directly, oldest first.
        relay.pool.queue.lock().push_back(Arc::clone(&a));
        relay.pool.queue.lock().push_back(Arc::clone(&b));

        let Admission::Paired(session) = relay.pool.admit(Arc::clone(&c), pair_into(&relay)) else {
            panic!("expected a pairing");
        };
        assert_eq!(session.id(), SessionId(1));
        assert_eq!(session.first().id(), a.id());
        assert_eq!(session.second().id(), c.id());
        assert_eq!(relay.pool.ids(), vec![b.id()]);
        assert!(a.session().is_some());
        assert!(c.session().is_some());
        assert!(b.session().is_none());
    }

    #[test]
    fn dead_waiter_is_swept_not_paired() {
        let relay = relay();
        let (a, _ca) = connect(&relay);
        let (b, _cb) = connect(&relay);
        relay.pool.admit(Arc::clone(&a), pair_into(&relay));

        // A's transport died but its teardown has not reached the pool yet.
        a.mark_dead();

        let outcome = relay.pool.admit(Arc::clone(&b), pair_into(&relay));
        assert!(matches!(outcome, Admission::Waiting { queued: 1 }));
        assert_eq!(relay.pool.ids(), vec![b.id()]);
        assert!(a.session().is_none());
    }

    #[test]
    fn depart_removes_unbound_connection() {
        let relay = relay();
        let (a, _ca) = connect(&relay);
        relay.pool.admit(Arc::clone(&a), pair_into(&relay));

        assert!(relay.pool.depart(&a).is_none());
        assert!(relay.pool.is_empty());
        assert!(relay.pool.depart(&a).is_none(), "second departure is a no-op");
    }

    #[test]
    fn depart_returns_session_for_bound_connection() {
        let relay = relay();
        let (a, _ca) = connect(&relay);
        let (b, _cb) = connect(&relay);
        relay.pool.admit(Arc::clone(&a), pair_into(&relay));
        let Admission::Paired(session) = relay.pool.admit(Arc::clone(&b), pair_into(&relay)) else {
            panic!("expected a pairing");
        };

        let found = relay.pool.depart(&a).expect("a is bound");
        assert_eq!(found.id(), session.id());
    }

    #[test]
    fn sweep_skips_every_dead_waiter_and_pairs_the_live_one() {
        let relay = relay();
        let (a, _ca) = connect(&relay);
        let (b, _cb) = connect(&relay);
        let (c, _cc) = connect(&relay);
        let (d, _cd) = connect(&relay);
        for waiter in [&a, &b, &c] {
            relay.pool.queue.lock().push_back(Arc::clone(waiter));
        }
        a.mark_dead();
        b.mark_dead();

        let Admission::Paired(session) = relay.pool.admit(Arc::clone(&d), pair_into(&relay)) else {
            panic!("expected a pairing");
        };
        assert_eq!(session.first().id(), c.id());
        assert!(relay.pool.is_empty());
    }
}
