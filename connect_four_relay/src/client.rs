// TCP client for connecting to the matchmaking relay.
//
// Provides a non-blocking interface for a game front end (or a test) to talk
// to the relay. Architecture:
// - `connect()` performs the TCP connect and reads the `CONNECTED:<id>`
//   greeting on the calling thread, then spawns a background reader thread.
// - The reader thread iterates `Frames`, decodes `ServerMessage`s, and pushes
//   them into an `mpsc` channel. When the transport closes it pushes a final
//   `DISCONNECT:server` (unless the relay already sent one), which is how a
//   front end learns the server went away.
// - The caller holds a `BufWriter<TcpStream>` for sending.
// - `poll()` drains the inbox non-blocking; `recv_timeout()` waits for one.
//
// This module lives in the relay crate because it has no UI dependencies
// (plain std TCP, protocol framing and mpsc), so integration tests can
// use the same code path a real client would.

use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use connect_four_protocol::error::ProtocolError;
use connect_four_protocol::framing::{Frames, read_text, write_text};
use connect_four_protocol::message::{ClientMessage, DisconnectReason, ServerMessage};
use connect_four_protocol::types::ConnectionId;
use thiserror::Error;
use tracing::debug;

/// How long `connect` waits for the greeting.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The first message was not `CONNECTED:<id>`.
    #[error("unexpected greeting: {0}")]
    UnexpectedGreeting(String),
}

/// TCP client for relay communication.
pub struct NetClient {
    id: ConnectionId,
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerMessage>,
    _reader_thread: Option<JoinHandle<()>>,
}

impl NetClient {
    /// Connect to a relay, read the greeting, and spawn a reader thread.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true).ok();
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let greeting = read_text(&mut reader)?;
        let id = match greeting.parse::<ServerMessage>()? {
            ServerMessage::Connected { id } => id,
            _ => return Err(ClientError::UnexpectedGreeting(greeting)),
        };

        // Clear the timeout for the long-lived reader loop.
        stream.set_read_timeout(None)?;

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::Builder::new()
            .name(format!("relay-client-{id}"))
            .spawn(move || reader_loop(reader, tx))?;

        Ok(Self {
            id,
            writer: BufWriter::new(stream),
            inbox: rx,
            _reader_thread: Some(reader_thread),
        })
    }

    /// Connection ID assigned by the relay.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn send(&mut self, msg: &ClientMessage) -> Result<(), ClientError> {
        write_text(&mut self.writer, &msg.to_string())?;
        Ok(())
    }

    pub fn send_move(&mut self, column: u32) -> Result<(), ClientError> {
        self.send(&ClientMessage::Move { column })
    }

    pub fn send_reset(&mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::Reset)
    }

    pub fn set_username(&mut self, name: &str) -> Result<(), ClientError> {
        self.send(&ClientMessage::SetUsername { name: name.into() })
    }

    pub fn send_private_chat(&mut self, text: &str) -> Result<(), ClientError> {
        self.send(&ClientMessage::PrivateChat { text: text.into() })
    }

    pub fn send_public_chat(&mut self, text: &str) -> Result<(), ClientError> {
        self.send(&ClientMessage::PublicChat { text: text.into() })
    }

    /// Close the connection. The relay sees EOF and tears the connection
    /// down; the reader thread ends on its own.
    pub fn disconnect(&mut self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }

    /// Drain all queued server messages (non-blocking).
    pub fn poll(&self) -> Vec<ServerMessage> {
        self.inbox.try_iter().collect()
    }

    /// Wait up to `timeout` for the next message. `None` on timeout or after
    /// the reader thread has finished and the inbox is empty.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ServerMessage> {
        match self.inbox.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Reader thread: decode frames in a loop, push to channel.
fn reader_loop(reader: BufReader<TcpStream>, tx: mpsc::Sender<ServerMessage>) {
    let mut server_said_goodbye = false;
    for frame in Frames::new(reader) {
        let Ok(text) = frame else { break };
        match text.parse::<ServerMessage>() {
            Ok(msg) => {
                if let ServerMessage::Disconnect {
                    reason: DisconnectReason::Server,
                } = msg
                {
                    server_said_goodbye = true;
                }
                if tx.send(msg).is_err() {
                    return; // Caller dropped the client
                }
            }
            Err(e) => debug!("ignoring {text:?}: {e}"),
        }
    }
    if !server_said_goodbye {
        let _ = tx.send(ServerMessage::Disconnect {
            reason: DisconnectReason::Server,
        });
    }
}
