// Core ID types for the matchmaking protocol.
//
// Lightweight newtypes used by `message.rs` (the `CONNECTED:<id>` greeting)
// and by the relay's connection and session bookkeeping
// (`connect_four_relay::connection`, `connect_four_relay::session`). Both are
// assigned by the relay from monotonically increasing counters starting at 1,
// never reused within a process lifetime.

use std::fmt;

/// Relay-assigned connection ID. Immutable for the life of the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Relay-assigned session ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
