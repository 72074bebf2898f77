// Two-player sessions and the set of live sessions.
//
// A `Session` binds exactly two connections for its whole life. It does not
// know the rules of the game: it forwards moves and resets to the other side
// and then flips whose turn it is by sending `TURN:false` to the sender and
// `TURN:true` to the receiver. Private chat is forwarded without touching
// the turn. Renames go through the shared procedure in `connection.rs`.
//
// The only per-session lock is `phase`. `start`, `relay` and `player_left`
// all hold it while they send, which serializes the two players' threads on
// this session: relayed messages from one sender keep their order, the two
// players always end up with opposite turn flags, and when both players drop
// at once exactly one `player_left` call does the cleanup.
//
// Both connections are bound in `pair`, before the opening messages go out
// in `start`. The waiting player's thread is already running by then, so a
// message it sends in that gap reaches `relay` while the phase is still
// `Pairing`. `relay` parks on the `opened` condvar until `start` (or a
// departure) moves the phase on, then handles the message normally.
//
// Lifetime: the `LiveSessions` set holds the only strong reference besides
// transient clones. Connections point back with a `Weak`, so removing a
// session from the set is what ends it.

use std::collections::BTreeMap;
use std::sync::Arc;

use connect_four_protocol::message::{ClientMessage, DisconnectReason, ServerMessage};
use connect_four_protocol::types::SessionId;
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use tracing::debug;

use crate::connection::{Connection, RenameScope, rename};
use crate::state::RelayState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Bound, opening messages not sent yet.
    Pairing,
    Active,
    Ended,
}

pub struct Session {
    id: SessionId,
    first: Arc<Connection>,
    second: Arc<Connection>,
    phase: Mutex<Phase>,
    /// Signalled whenever `phase` leaves `Pairing`.
    opened: Condvar,
}

impl Session {
    /// Create a session and bind both connections to it.
    pub fn pair(id: SessionId, first: Arc<Connection>, second: Arc<Connection>) -> Arc<Self> {
        debug_assert_ne!(first.id(), second.id(), "a session needs two connections");
        let session = Arc::new(Self {
            id,
            first,
            second,
            phase: Mutex::new(Phase::Pairing),
            opened: Condvar::new(),
        });
        session.first.bind(&session);
        session.second.bind(&session);
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn first(&self) -> &Arc<Connection> {
        &self.first
    }

    pub fn second(&self) -> &Arc<Connection> {
        &self.second
    }

    /// The other player. `conn` must be one of the two.
    fn opponent_of(&self, conn: &Connection) -> &Arc<Connection> {
        if conn.id() == self.first.id() {
            &self.second
        } else {
            &self.first
        }
    }

    /// Exchange opponent names and pick who moves first, 50/50.
    pub fn start<R: Rng>(&self, relay: &RelayState, rng: &mut R) {
        let first_moves = rng.gen_bool(0.5);
        self.start_with(relay, first_moves);
    }

    /// `start` with the first mover chosen by the caller.
    pub fn start_with(&self, relay: &RelayState, first_moves: bool) {
        let mut phase = self.phase.lock();
        if *phase != Phase::Pairing {
            return;
        }
        *phase = Phase::Active;

        self.first.send(&ServerMessage::OpponentName {
            name: self.second.name(),
        });
        self.second.send(&ServerMessage::OpponentName {
            name: self.first.name(),
        });
        self.first.send(&ServerMessage::Turn {
            your_turn: first_moves,
        });
        self.second.send(&ServerMessage::Turn {
            your_turn: !first_moves,
        });

        self.opened.notify_all();

        let mover = if first_moves { &self.first } else { &self.second };
        relay.events.game(format!(
            "Session {}: {} moves first",
            self.id,
            mover.label()
        ));
    }

    /// Handle one message from `from`, which must belong to this session.
    pub fn relay(&self, relay: &RelayState, from: &Connection, msg: ClientMessage) {
        let mut phase = self.phase.lock();
        while *phase == Phase::Pairing {
            self.opened.wait(&mut phase);
        }
        if *phase != Phase::Active {
            debug!(session = %self.id, "ignoring {} in phase {:?}", msg.tag(), *phase);
            return;
        }
        let to = self.opponent_of(from);

        match msg {
            ClientMessage::SetUsername { name } => {
                rename(
                    relay,
                    from,
                    &name,
                    RenameScope::Session {
                        id: self.id,
                        opponent: to,
                    },
                );
            }
            ClientMessage::PrivateChat { text } => {
                to.send(&ServerMessage::PrivateChat { text });
                relay.events.game(format!(
                    "Session {}: {} sent a private message",
                    self.id,
                    from.label()
                ));
            }
            ClientMessage::PublicChat { text } => relay.broadcast_public(from, &text),
            ClientMessage::Move { column } => {
                to.send(&ServerMessage::Move { column });
                self.flip_turn(from, to);
                relay.events.game(format!(
                    "Session {}: {} played column {column}",
                    self.id,
                    from.label()
                ));
            }
            ClientMessage::Reset => {
                to.send(&ServerMessage::Reset);
                self.flip_turn(from, to);
                relay.events.game(format!(
                    "Session {}: {} played RESET",
                    self.id,
                    from.label()
                ));
            }
        }
    }

    fn flip_turn(&self, from: &Connection, to: &Connection) {
        from.send(&ServerMessage::Turn { your_turn: false });
        to.send(&ServerMessage::Turn { your_turn: true });
    }

    /// `gone` has disconnected: notify the other player, release `gone`'s
    /// name, and drop the session from the live set. Only the first call does
    /// the session-level work; every call releases its own caller's name.
    pub fn player_left(&self, relay: &RelayState, gone: &Connection) {
        let mut phase = self.phase.lock();
        let previous = std::mem::replace(&mut *phase, Phase::Ended);
        self.opened.notify_all();
        gone.unbind(self.id);
        relay.names.release(&gone.name());
        if previous == Phase::Ended {
            return;
        }

        let other = self.opponent_of(gone);
        other.send(&ServerMessage::Disconnect {
            reason: DisconnectReason::Opponent,
        });
        other.unbind(self.id);
        relay.sessions.remove(self.id);
        relay.events.game(format!(
            "Session {}: {} disconnected",
            self.id,
            gone.label()
        ));
    }
}

/// Every session currently in play, keyed by ID.
#[derive(Default)]
pub struct LiveSessions {
    sessions: Mutex<BTreeMap<SessionId, Arc<Session>>>,
}

impl LiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.lock().insert(session.id(), session);
    }

    /// Remove a session. Returns whether it was present.
    pub fn remove(&self, id: SessionId) -> bool {
        self.sessions.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
