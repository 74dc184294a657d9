use crate::message_type::MessageType;

/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload does not parse as an envelope.
    #[error("malformed message: {0}")]
    Malformed(#[from] prost::DecodeError),

    /// The envelope parsed but carries no header.
    #[error("malformed message: missing header")]
    MissingHeader,

    /// The header sentinels do not match this protocol.
    #[error("protocol mismatch (magic {magic:#010x}, version {version})")]
    ProtocolMismatch { magic: u32, version: u32 },

    /// Message content could not be serialized.
    #[error("invalid message content: {0}")]
    Content(#[from] serde_json::Error),

    /// The outbound message type does not accept the given target.
    #[error("{msg_type} cannot be addressed to a {target}")]
    InvalidTarget {
        msg_type: MessageType,
        target: &'static str,
    },
}

impl CodecError {
    /// True for schema failures, false for sentinel mismatches and build errors.
    pub fn is_malformed(&self) -> bool {
        matches!(self, CodecError::Malformed(_) | CodecError::MissingHeader)
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
