//! Envelope schema and message codec for the imlink protocol.
//!
//! A frame payload is a protobuf-encoded envelope: a fixed header (magic, version,
//! message type, extension flag) and an optional body. Commands such as HELLO and
//! HEART_BEAT carry no body; data messages do.

pub mod codec;
pub mod content;
pub mod envelope;
pub mod error;
pub mod message_type;

mod schema;

pub use codec::{decode_envelope, encode_envelope, envelope_frame};
pub use envelope::{
    new_seq, Body, Envelope, Header, OutboundMessage, Sender, Target, MAGIC, VERSION,
};
pub use error::{CodecError, Result};
pub use message_type::MessageType;
