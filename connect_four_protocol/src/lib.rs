// connect_four_protocol: wire protocol for the Connect Four relay.
//
// This crate defines the message vocabulary, text encoding, and framing used
// by the matchmaking relay (`connect_four_relay`) and game clients to talk
// over TCP. It is shared between both sides and knows nothing about boards,
// win detection, or UI.
//
// Module overview:
// - `types.rs`:    ID newtypes (`ConnectionId`, `SessionId`).
// - `message.rs`:  `ClientMessage` / `ServerMessage` enums with their
//                  `TAG:payload` text form (`Display` / `FromStr`).
// - `error.rs`:    `ProtocolError` for text that frames fine but does not
//                  decode.
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  4-byte big-endian length prefix, then UTF-8 text. Also the
//                  `Frames` iterator used by receive loops.
//
// Design decisions:
// - **Text payloads.** Messages keep the `TAG:payload` strings the existing
//   desktop clients understand; only the framing around them is binary.
// - **No async runtime.** Uses `std::io::Read`/`Write`, compatible with
//   blocking TCP streams and buffered wrappers.

pub mod error;
pub mod framing;
pub mod message;
pub mod types;

pub use error::ProtocolError;
pub use framing::{Frames, MAX_MESSAGE_SIZE, read_message, read_text, write_message, write_text};
pub use message::{ClientMessage, DisconnectReason, ServerMessage};
pub use types::{ConnectionId, SessionId};
