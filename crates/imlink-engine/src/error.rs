use imlink_proto::{CodecError, MessageType};

/// Errors raised by the connection engine.
///
/// Only [`EngineError::DeliveryExhausted`] reaches business logic through the normal send
/// path. Connectivity failures become state transitions plus reconnection and show up in
/// logs.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A received frame does not parse as an envelope.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A received envelope carries the wrong magic or version.
    #[error("protocol mismatch (magic {magic:#010x}, version {version})")]
    ProtocolMismatch { magic: u32, version: u32 },

    /// A message could not be built for sending.
    #[error("invalid message: {0}")]
    InvalidMessage(CodecError),

    /// The channel is not connected.
    #[error("channel unavailable")]
    ChannelUnavailable,

    /// Resend budget spent without the channel coming back.
    #[error("delivery of {message_type} (seq {seq}) exhausted after {attempts} retries")]
    DeliveryExhausted {
        seq: String,
        message_type: MessageType,
        attempts: u32,
    },

    /// Too many heartbeat probes went unanswered.
    #[error("heartbeat timed out after {0} unanswered probes")]
    HeartbeatTimeout(u32),

    /// Opening the channel or the HELLO exchange failed.
    #[error("handshake failed: {0}")]
    HandshakeFailure(String),

    /// Frame-level error on the receive path.
    #[error("frame error: {0}")]
    Frame(#[from] imlink_frame::FrameError),

    /// Credentials could not be obtained.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Transport-level error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The async driver task has stopped.
    #[error("engine driver stopped")]
    DriverClosed,
}

impl From<CodecError> for EngineError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::ProtocolMismatch { magic, version } => {
                EngineError::ProtocolMismatch { magic, version }
            }
            err if err.is_malformed() => EngineError::MalformedMessage(err.to_string()),
            err => EngineError::InvalidMessage(err),
        }
    }
}

/// Credential lookup failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("access token unavailable: {0}")]
    TokenUnavailable(String),

    #[error("signing secret unavailable: {0}")]
    SecretUnavailable(String),

    #[error("invalid signing key length")]
    InvalidKey,
}

/// Transport failures reported by a [`crate::Connector`] or [`crate::Channel`].
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to open channel to {url}: {reason}")]
    Open { url: String, reason: String },

    #[error("channel closed")]
    Closed,

    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_map_to_taxonomy() {
        let mismatch = CodecError::ProtocolMismatch {
            magic: 1,
            version: 9,
        };
        assert!(matches!(
            EngineError::from(mismatch),
            EngineError::ProtocolMismatch {
                magic: 1,
                version: 9
            }
        ));
        assert!(matches!(
            EngineError::from(CodecError::MissingHeader),
            EngineError::MalformedMessage(_)
        ));
        let invalid = CodecError::InvalidTarget {
            msg_type: MessageType::Chat,
            target: "group",
        };
        assert!(matches!(
            EngineError::from(invalid),
            EngineError::InvalidMessage(_)
        ));
    }

    #[test]
    fn exhausted_message_names_the_send() {
        let err = EngineError::DeliveryExhausted {
            seq: "abc".into(),
            message_type: MessageType::Chat,
            attempts: 5,
        };
        assert_eq!(
            err.to_string(),
            "delivery of CHAT (seq abc) exhausted after 5 retries"
        );
    }
}
