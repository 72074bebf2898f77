// Length-delimited message framing over TCP.
//
// Wire format: a 4-byte big-endian length prefix followed by a UTF-8 payload
// holding exactly one protocol message (see `message.rs`). `write_message`
// and `read_message` move raw bytes; `write_text` / `read_text` add the UTF-8
// step; `Frames` turns any reader into a lazy, blocking iterator of message
// texts that ends at the first EOF or error.
//
// A `MAX_MESSAGE_SIZE` constant (64 KB) protects against unbounded allocation
// from malformed or malicious length prefixes. Chat lines are the largest
// expected messages.

use std::io::{self, Read, Write};

/// Maximum allowed message size (64 KB).
pub const MAX_MESSAGE_SIZE: u32 = 64 * 1024;

/// Write a length-delimited message: 4-byte big-endian length, then payload.
pub fn write_message<W: Write>(writer: &mut W, msg: &[u8]) -> io::Result<()> {
    let len = u32::try_from(msg.len())
        .ok()
        .filter(|len| *len <= MAX_MESSAGE_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "message too large: {} bytes (max {MAX_MESSAGE_SIZE})",
                    msg.len()
                ),
            )
        })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(msg)?;
    writer.flush()?;
    Ok(())
}

/// Read a length-delimited message: 4-byte big-endian length, then payload.
///
/// Returns `UnexpectedEof` if the stream closes cleanly before or during a
/// message. Returns `InvalidData` if the length exceeds `MAX_MESSAGE_SIZE`.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Write one protocol message as a UTF-8 frame.
pub fn write_text<W: Write>(writer: &mut W, text: &str) -> io::Result<()> {
    write_message(writer, text.as_bytes())
}

/// Read one frame and decode it as UTF-8. Invalid UTF-8 is `InvalidData`.
pub fn read_text<R: Read>(reader: &mut R) -> io::Result<String> {
    let bytes = read_message(reader)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Lazy sequence of message texts read from a stream.
///
/// Each call to `next` blocks until a whole frame has arrived. The iterator
/// yields the first error it meets and then fuses; a clean close before any
/// partial frame ends it without an error.
pub struct Frames<R> {
    reader: R,
    done: bool,
}

impl<R: Read> Frames<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }
}

impl<R: Read> Iterator for Frames<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match read_text(&mut self.reader) {
            Ok(text) => Some(Ok(text)),
            Err(e) => {
                self.done = true;
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    None
                } else {
                    Some(Err(e))
                }
            }
        }
    }
}
