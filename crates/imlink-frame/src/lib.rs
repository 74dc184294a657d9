//! Varint length-prefixed framing for the imlink wire protocol.
//!
//! Every message on the channel is framed as:
//! - A base-128 varint holding the payload length (least-significant group first,
//!   continuation bit `0x80` on every byte but the last)
//! - The payload bytes
//!
//! The decoder tolerates partial and coalesced reads: complete frames are returned in
//! arrival order and any trailing partial frame stays buffered for the next read.

pub mod codec;
pub mod decoder;
pub mod error;
pub mod reader;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    decode, decode_frame, decode_varint, decode_with_config, encode, encode_frame,
    encode_varint, FrameConfig, DEFAULT_MAX_PAYLOAD, MAX_VARINT_LEN,
};
pub use decoder::FrameDecoder;
pub use error::{FrameError, Result};
pub use reader::FrameReader;

#[cfg(feature = "async")]
pub use async_codec::VarintCodec;
