// Protocol messages for client-relay communication.
//
// Two enums define the full protocol vocabulary:
// - `ClientMessage`: sent by game clients to the relay.
// - `ServerMessage`: sent by the relay to game clients, including the
//   relayed copies of an opponent's moves, resets and private chat.
//
// Every message travels as one text frame of the form `TAG` or
// `TAG:payload`. Decoding splits on the first `:` only, so payloads (chat text
// in particular) may contain further colons. `Display` produces the wire text
// and `FromStr` parses it; the two are exact inverses for every value the
// relay produces.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;
use crate::types::ConnectionId;

/// Wire tags, shared by both directions where the same message is relayed.
pub mod tag {
    pub const CONNECTED: &str = "CONNECTED";
    pub const STATUS: &str = "STATUS";
    pub const USERNAME_ACCEPTED: &str = "USERNAME_ACCEPTED";
    pub const USERNAME_TAKEN: &str = "USERNAME_TAKEN";
    pub const USERNAME_LIST: &str = "USERNAME_LIST";
    pub const OPPONENT_NAME: &str = "OPPONENT_NAME";
    pub const OPPONENT_RENAMED: &str = "OPPONENT_RENAMED";
    pub const TURN: &str = "TURN";
    pub const MOVE: &str = "MOVE";
    pub const RESET: &str = "RESET";
    pub const SET_USERNAME: &str = "SET_USERNAME";
    pub const PRIVATE_CHAT: &str = "PRIVATE_CHAT";
    pub const PUBLIC_CHAT: &str = "PUBLIC_CHAT";
    pub const DISCONNECT: &str = "DISCONNECT";
}

const STATUS_WAITING: &str = "WAITING";

/// Messages sent by a client to the relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// Drop a piece in `column`. Relayed to the opponent; flips the turn.
    Move { column: u32 },
    /// Start a new game on the same board. Relayed; flips the turn.
    Reset,
    /// Request a new display name. Valid before and during a session.
    SetUsername { name: String },
    /// Chat with the current opponent only.
    PrivateChat { text: String },
    /// Chat with every connected player.
    PublicChat { text: String },
}

/// Why a `DISCONNECT` notification was sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The other player in the session went away.
    Opponent,
    /// The relay itself is closing this connection.
    Server,
}

impl DisconnectReason {
    fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::Opponent => "opponent",
            DisconnectReason::Server => "server",
        }
    }
}

/// Messages sent by the relay to a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerMessage {
    /// Greeting carrying the relay-assigned connection ID.
    Connected { id: ConnectionId },
    /// Placed in the waiting pool until an opponent arrives.
    Waiting,
    /// A rename (or the initial default name) was confirmed.
    UsernameAccepted { name: String },
    /// A rename was rejected; the old name is kept.
    UsernameTaken { name: String },
    /// Every name currently claimed, reserved names first.
    UsernameList { names: Vec<String> },
    /// Sent once when a session starts.
    OpponentName { name: String },
    /// The opponent changed name mid-session.
    OpponentRenamed { name: String },
    /// Whether the recipient may move now.
    Turn { your_turn: bool },
    /// The opponent's move.
    Move { column: u32 },
    /// The opponent reset the board.
    Reset,
    /// Private chat from the opponent.
    PrivateChat { text: String },
    /// Public chat from any connected player.
    PublicChat { from: String, text: String },
    /// The connection, or the opponent's connection, has ended.
    Disconnect { reason: DisconnectReason },
}

impl ClientMessage {
    /// Wire tag, for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            ClientMessage::Move { .. } => tag::MOVE,
            ClientMessage::Reset => tag::RESET,
            ClientMessage::SetUsername { .. } => tag::SET_USERNAME,
            ClientMessage::PrivateChat { .. } => tag::PRIVATE_CHAT,
            ClientMessage::PublicChat { .. } => tag::PUBLIC_CHAT,
        }
    }
}

/// Split `TAG:payload` on the first colon.
fn split_tag(line: &str) -> (&str, Option<&str>) {
    match line.split_once(':') {
        Some((tag, payload)) => (tag, Some(payload)),
        None => (line, None),
    }
}

fn require<'a>(tag: &'static str, payload: Option<&'a str>) -> Result<&'a str, ProtocolError> {
    payload.ok_or(ProtocolError::MissingPayload { tag })
}

fn parse_column(payload: Option<&str>) -> Result<u32, ProtocolError> {
    let value = require(tag::MOVE, payload)?;
    value.trim().parse().map_err(|_| ProtocolError::InvalidPayload {
        tag: tag::MOVE,
        value: value.to_string(),
    })
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMessage::Move { column } => write!(f, "{}:{column}", tag::MOVE),
            ClientMessage::Reset => f.write_str(tag::RESET),
            ClientMessage::SetUsername { name } => write!(f, "{}:{name}", tag::SET_USERNAME),
            ClientMessage::PrivateChat { text } => write!(f, "{}:{text}", tag::PRIVATE_CHAT),
            ClientMessage::PublicChat { text } => write!(f, "{}:{text}", tag::PUBLIC_CHAT),
        }
    }
}

impl FromStr for ClientMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (t, payload) = split_tag(line);
        match t {
            tag::MOVE => Ok(ClientMessage::Move {
                column: parse_column(payload)?,
            }),
            tag::RESET => Ok(ClientMessage::Reset),
            tag::SET_USERNAME => Ok(ClientMessage::SetUsername {
                name: require(tag::SET_USERNAME, payload)?.to_string(),
            }),
            tag::PRIVATE_CHAT => Ok(ClientMessage::PrivateChat {
                text: require(tag::PRIVATE_CHAT, payload)?.to_string(),
            }),
            tag::PUBLIC_CHAT => Ok(ClientMessage::PublicChat {
                text: require(tag::PUBLIC_CHAT, payload)?.to_string(),
            }),
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Connected { id } => write!(f, "{}:{id}", tag::CONNECTED),
            ServerMessage::Waiting => write!(f, "{}:{STATUS_WAITING}", tag::STATUS),
            ServerMessage::UsernameAccepted { name } => {
                write!(f, "{}:{name}", tag::USERNAME_ACCEPTED)
            }
            ServerMessage::UsernameTaken { name } => write!(f, "{}:{name}", tag::USERNAME_TAKEN),
            ServerMessage::UsernameList { names } => {
                write!(f, "{}:{}", tag::USERNAME_LIST, names.join(","))
            }
            ServerMessage::OpponentName { name } => write!(f, "{}:{name}", tag::OPPONENT_NAME),
            ServerMessage::OpponentRenamed { name } => {
                write!(f, "{}:{name}", tag::OPPONENT_RENAMED)
            }
            ServerMessage::Turn { your_turn } => write!(f, "{}:{your_turn}", tag::TURN),
            ServerMessage::Move { column } => write!(f, "{}:{column}", tag::MOVE),
            ServerMessage::Reset => f.write_str(tag::RESET),
            ServerMessage::PrivateChat { text } => write!(f, "{}:{text}", tag::PRIVATE_CHAT),
            ServerMessage::PublicChat { from, text } => {
                write!(f, "{}:{from}:{text}", tag::PUBLIC_CHAT)
            }
            ServerMessage::Disconnect { reason } => {
                write!(f, "{}:{}", tag::DISCONNECT, reason.as_str())
            }
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (t, payload) = split_tag(line);
        let text = |tag: &'static str| require(tag, payload).map(str::to_string);
        match t {
            tag::CONNECTED => {
                let value = require(tag::CONNECTED, payload)?;
                let id = value.parse().map_err(|_| ProtocolError::InvalidPayload {
                    tag: tag::CONNECTED,
                    value: value.to_string(),
                })?;
                Ok(ServerMessage::Connected {
                    id: ConnectionId(id),
                })
            }
            tag::STATUS => match require(tag::STATUS, payload)? {
                STATUS_WAITING => Ok(ServerMessage::Waiting),
                other => Err(ProtocolError::InvalidPayload {
                    tag: tag::STATUS,
                    value: other.to_string(),
                }),
            },
            tag::USERNAME_ACCEPTED => Ok(ServerMessage::UsernameAccepted {
                name: text(tag::USERNAME_ACCEPTED)?,
            }),
            tag::USERNAME_TAKEN => Ok(ServerMessage::UsernameTaken {
                name: text(tag::USERNAME_TAKEN)?,
            }),
            tag::USERNAME_LIST => {
                let list = require(tag::USERNAME_LIST, payload)?;
                let names = if list.is_empty() {
                    Vec::new()
                } else {
                    list.split(',').map(str::to_string).collect()
                };
                Ok(ServerMessage::UsernameList { names })
            }
            tag::OPPONENT_NAME => Ok(ServerMessage::OpponentName {
                name: text(tag::OPPONENT_NAME)?,
            }),
            tag::OPPONENT_RENAMED => Ok(ServerMessage::OpponentRenamed {
                name: text(tag::OPPONENT_RENAMED)?,
            }),
            tag::TURN => {
                let value = require(tag::TURN, payload)?;
                let your_turn = value.parse().map_err(|_| ProtocolError::InvalidPayload {
                    tag: tag::TURN,
                    value: value.to_string(),
                })?;
                Ok(ServerMessage::Turn { your_turn })
            }
            tag::MOVE => Ok(ServerMessage::Move {
                column: parse_column(payload)?,
            }),
            tag::RESET => Ok(ServerMessage::Reset),
            tag::PRIVATE_CHAT => Ok(ServerMessage::PrivateChat {
                text: text(tag::PRIVATE_CHAT)?,
            }),
            tag::PUBLIC_CHAT => {
                // Older senders omit the name; treat the whole payload as text.
                let body = require(tag::PUBLIC_CHAT, payload)?;
                let (from, text) = body.split_once(':').unwrap_or(("", body));
                Ok(ServerMessage::PublicChat {
                    from: from.to_string(),
                    text: text.to_string(),
                })
            }
            tag::DISCONNECT => match require(tag::DISCONNECT, payload)? {
                "opponent" => Ok(ServerMessage::Disconnect {
                    reason: DisconnectReason::Opponent,
                }),
                "server" => Ok(ServerMessage::Disconnect {
                    reason: DisconnectReason::Server,
                }),
                other => Err(ProtocolError::InvalidPayload {
                    tag: tag::DISCONNECT,
                    value: other.to_string(),
                }),
            },
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }
}
