// Test-only player for multiplayer integration tests.
//
// Wraps the real `NetClient` (from `connect_four_relay::client`) and a local
// Connect Four board to provide a synchronous, test-friendly API for
// exercising the full pipeline: connect → wait → pair → move → relay →
// opponent's board. The relay never looks at the board; keeping one on each
// side lets the tests check that both players end up seeing the same game.
//
// The only test-specific code here is the blocking wrappers around
// `NetClient::recv_timeout()` and the board itself. All networking uses the
// same code path a real front end would.
//
// See also: `tests/full_pipeline.rs` for the integration test scenarios.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use connect_four_protocol::message::{DisconnectReason, ServerMessage};
use connect_four_protocol::types::ConnectionId;
use connect_four_relay::client::NetClient;

/// Default timeout for blocking waits.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Granularity of each `recv_timeout` inside a blocking wait.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub const COLUMNS: usize = 7;
pub const ROWS: usize = 6;

/// Whose disc sits in a cell, from the board owner's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disc {
    Own,
    Opponent,
}

impl Disc {
    /// The same disc as the other player sees it.
    pub fn flipped(self) -> Self {
        match self {
            Disc::Own => Disc::Opponent,
            Disc::Opponent => Disc::Own,
        }
    }
}

/// A 7x6 gravity board. Row 0 is the bottom.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Board {
    cells: [[Option<Disc>; ROWS]; COLUMNS],
}

impl Board {
    /// Drop a disc into `column`. Returns the row it landed in, or `None`
    /// if the column is full or out of range.
    pub fn drop_disc(&mut self, column: usize, disc: Disc) -> Option<usize> {
        let col = self.cells.get_mut(column)?;
        let row = col.iter().position(Option::is_none)?;
        col[row] = Some(disc);
        Some(row)
    }

    pub fn cell(&self, column: usize, row: usize) -> Option<Disc> {
        self.cells[column][row]
    }

    /// The board as the opponent sees it.
    pub fn mirrored(&self) -> Self {
        let mut cells = self.cells;
        for cell in cells.iter_mut().flatten() {
            *cell = cell.map(Disc::flipped);
        }
        Self { cells }
    }

    /// The owner of any four in a row, if there is one.
    pub fn winner(&self) -> Option<Disc> {
        const DIRECTIONS: [(isize, isize); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];
        for col in 0..COLUMNS {
            for row in 0..ROWS {
                let Some(disc) = self.cells[col][row] else {
                    continue;
                };
                for (dc, dr) in DIRECTIONS {
                    let run = (1..4).all(|step| {
                        let c = col as isize + dc * step;
                        let r = row as isize + dr * step;
                        (0..COLUMNS as isize).contains(&c)
                            && (0..ROWS as isize).contains(&r)
                            && self.cells[c as usize][r as usize] == Some(disc)
                    });
                    if run {
                        return Some(disc);
                    }
                }
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().flatten().all(Option::is_none)
    }
}

/// A test player wrapping a real NetClient and a local board.
pub struct TestPlayer {
    client: NetClient,
    pub name: String,
    pub opponent: Option<String>,
    pub my_turn: bool,
    pub board: Board,
    /// Private chat lines received from the opponent.
    pub private_chat: Vec<String>,
    /// Public chat lines received, as (sender, text).
    pub public_chat: Vec<(String, String)>,
    pub disconnected: Option<DisconnectReason>,
}

impl TestPlayer {
    /// Connect to a relay. The greeting is consumed by `NetClient::connect`.
    pub fn connect(addr: SocketAddr) -> Self {
        let client = NetClient::connect(addr).expect("TestPlayer::connect failed");
        let name = format!("User{}", client.id());
        Self {
            client,
            name,
            opponent: None,
            my_turn: false,
            board: Board::default(),
            private_chat: Vec::new(),
            public_chat: Vec::new(),
            disconnected: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.client.id()
    }

    /// Fold one server message into the local view of the game.
    fn apply(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::UsernameAccepted { name } => self.name = name.clone(),
            ServerMessage::OpponentName { name } | ServerMessage::OpponentRenamed { name } => {
                self.opponent = Some(name.clone());
            }
            ServerMessage::Turn { your_turn } => self.my_turn = *your_turn,
            ServerMessage::Move { column } => {
                self.board
                    .drop_disc(*column as usize, Disc::Opponent)
                    .expect("opponent played into a full column");
            }
            ServerMessage::Reset => self.board = Board::default(),
            ServerMessage::PrivateChat { text } => self.private_chat.push(text.clone()),
            ServerMessage::PublicChat { from, text } => {
                self.public_chat.push((from.clone(), text.clone()));
            }
            ServerMessage::Disconnect { reason } => self.disconnected = Some(*reason),
            _ => {}
        }
    }

    /// Block until a message matching `pred` arrives, applying every message
    /// seen along the way. Returns the matching message.
    pub fn wait_for(
        &mut self,
        what: &str,
        mut pred: impl FnMut(&ServerMessage) -> bool,
    ) -> ServerMessage {
        let start = Instant::now();
        loop {
            assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for {what}");
            if let Some(msg) = self.client.recv_timeout(POLL_INTERVAL) {
                self.apply(&msg);
                if pred(&msg) {
                    return msg;
                }
            }
        }
    }

    /// Block until the session starts. Returns whether this player moves
    /// first.
    pub fn wait_for_opponent(&mut self) -> bool {
        self.wait_for("OPPONENT_NAME", |m| {
            matches!(m, ServerMessage::OpponentName { .. })
        });
        self.wait_for("TURN", |m| matches!(m, ServerMessage::Turn { .. }));
        self.my_turn
    }

    /// Block until the opponent's move arrives and the turn passes here.
    /// Returns the column played.
    pub fn wait_for_opponent_move(&mut self) -> u32 {
        let ServerMessage::Move { column } =
            self.wait_for("MOVE", |m| matches!(m, ServerMessage::Move { .. }))
        else {
            unreachable!()
        };
        self.wait_for("TURN:true", |m| {
            matches!(m, ServerMessage::Turn { your_turn: true })
        });
        column
    }

    /// Play a disc: update the local board, send the move, and wait for the
    /// relay to hand the turn over.
    pub fn play(&mut self, column: u32) {
        assert!(self.my_turn, "{} played out of turn", self.name);
        self.board
            .drop_disc(column as usize, Disc::Own)
            .expect("played into a full column");
        self.client.send_move(column).expect("send_move failed");
        self.wait_for("TURN:false", |m| {
            matches!(m, ServerMessage::Turn { your_turn: false })
        });
    }

    /// Clear the local board and ask the relay to reset the opponent's.
    pub fn reset(&mut self) {
        self.board = Board::default();
        self.client.send_reset().expect("send_reset failed");
        self.wait_for("TURN:false", |m| {
            matches!(m, ServerMessage::Turn { your_turn: false })
        });
    }

    /// Request a new name. Returns whether the relay accepted it.
    pub fn rename(&mut self, name: &str) -> bool {
        self.client.set_username(name).expect("set_username failed");
        let reply = self.wait_for("username reply", |m| {
            matches!(
                m,
                ServerMessage::UsernameAccepted { .. } | ServerMessage::UsernameTaken { .. }
            )
        });
        matches!(reply, ServerMessage::UsernameAccepted { .. })
    }

    pub fn say_private(&mut self, text: &str) {
        self.client
            .send_private_chat(text)
            .expect("send_private_chat failed");
    }

    pub fn say_public(&mut self, text: &str) {
        self.client
            .send_public_chat(text)
            .expect("send_public_chat failed");
    }

    /// Everything currently queued, applied and returned.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let messages = self.client.poll();
        for msg in &messages {
            self.apply(msg);
        }
        messages
    }

    /// Close the connection.
    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }
}
