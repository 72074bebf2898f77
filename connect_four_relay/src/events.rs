// Event sink: lifecycle and game notifications for an external monitor.
//
// The relay never depends on anyone reading these. Events go into a bounded
// `mpsc::sync_channel` with `try_send`, so a slow or absent monitor costs
// dropped events, never a blocked connection thread. Every event is also
// logged through `tracing` so nothing is lost when no monitor is attached.

use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use tracing::{debug, trace};

/// A notification for the monitor. `Display` renders the tagged form
/// (`CONN:...` / `GAME:...`) older monitors expect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayEvent {
    /// Connection lifecycle: listening, connects, disconnects, raw traffic,
    /// pre-session renames.
    Connection(String),
    /// Session lifecycle: waiting, pairing, moves, in-session renames,
    /// departures.
    Game(String),
}

impl RelayEvent {
    pub fn text(&self) -> &str {
        match self {
            RelayEvent::Connection(text) | RelayEvent::Game(text) => text,
        }
    }
}

impl fmt::Display for RelayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayEvent::Connection(text) => write!(f, "CONN:{text}"),
            RelayEvent::Game(text) => write!(f, "GAME:{text}"),
        }
    }
}

/// Write side of the event channel. Cheap to clone; a sink with no channel
/// only logs.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<SyncSender<RelayEvent>>,
}

impl EventSink {
    /// Create a sink and the receiver a monitor drains.
    pub fn channel(capacity: usize) -> (Self, Receiver<RelayEvent>) {
        let (tx, rx) = mpsc::sync_channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that only logs.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn connection(&self, text: impl Into<String>) {
        self.emit(RelayEvent::Connection(text.into()));
    }

    pub fn game(&self, text: impl Into<String>) {
        self.emit(RelayEvent::Game(text.into()));
    }

    fn emit(&self, event: RelayEvent) {
        debug!("{event}");
        let Some(tx) = &self.tx else { return };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => trace!("event channel full, dropped: {event}"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
