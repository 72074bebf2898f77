// Decode errors for protocol text.
//
// Framing failures stay `std::io::Error` (see `framing.rs`); these cover a
// frame that arrived intact but whose text is not a message we understand.

use thiserror::Error;

/// A well-framed message that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The tag before the first `:` is not part of the vocabulary.
    #[error("unknown message tag: {0:?}")]
    UnknownTag(String),

    /// A tag that requires a payload arrived without one.
    #[error("message {tag} requires a payload")]
    MissingPayload { tag: &'static str },

    /// The payload could not be parsed for this tag.
    #[error("invalid payload for {tag}: {value:?}")]
    InvalidPayload { tag: &'static str, value: String },
}
