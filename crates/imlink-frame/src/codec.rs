use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Longest varint accepted for a length prefix (enough for any `u64`).
pub const MAX_VARINT_LEN: usize = 10;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Append `value` as a base-128 varint, least-significant group first.
pub fn encode_varint(mut value: u64, dst: &mut BytesMut) {
    loop {
        let group = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            dst.put_u8(group);
            return;
        }
        dst.put_u8(group | 0x80);
    }
}

/// Read a varint from the front of `src`.
///
/// Returns `Ok(None)` when `src` ends before the final (continuation-free) byte,
/// otherwise the decoded value and the number of prefix bytes consumed.
pub fn decode_varint(src: &[u8]) -> Result<Option<(u64, usize)>> {
    let mut value = 0u64;
    for (index, &byte) in src.iter().enumerate() {
        if index >= MAX_VARINT_LEN {
            return Err(FrameError::LengthOverflow);
        }
        let group = u64::from(byte & 0x7f);
        let shift = 7 * index as u32;
        // The tenth byte may only carry the single remaining bit of a u64.
        if index == MAX_VARINT_LEN - 1 && group > 1 {
            return Err(FrameError::LengthOverflow);
        }
        value |= group << shift;
        if byte & 0x80 == 0 {
            return Ok(Some((value, index + 1)));
        }
    }

    if src.len() >= MAX_VARINT_LEN {
        return Err(FrameError::LengthOverflow);
    }
    Ok(None)
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌─────────────────────┬──────────────────┐
/// │ Length              │ Payload          │
/// │ (varint, 1-10 B)    │ (Length bytes)   │
/// └─────────────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(MAX_VARINT_LEN + payload.len());
    encode_varint(payload.len() as u64, dst);
    dst.put_slice(payload);
}

/// Encode a payload into a freshly allocated frame.
pub fn encode(payload: &[u8]) -> Bytes {
    let mut dst = BytesMut::with_capacity(MAX_VARINT_LEN + payload.len());
    encode_frame(payload, &mut dst);
    dst.freeze()
}

/// Decode one frame from the front of a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet; the buffer is
/// left untouched in that case. On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    let Some((len, prefix_len)) = decode_varint(src)? else {
        return Ok(None); // Need more data
    };

    if len > max_payload as u64 {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: max_payload,
        });
    }

    let len = len as usize;
    if src.len() < prefix_len + len {
        return Ok(None); // Need more data
    }

    src.advance(prefix_len);
    Ok(Some(src.split_to(len).freeze()))
}

/// Split a buffer into every complete frame it holds plus the undecoded remainder.
///
/// The remainder is meant to be prepended to the next chunk read from the channel.
/// Payloads above [`DEFAULT_MAX_PAYLOAD`] are rejected; use [`decode_with_config`] to
/// pick another limit.
pub fn decode(buffer: &[u8]) -> Result<(Vec<Bytes>, Bytes)> {
    decode_with_config(buffer, &FrameConfig::default())
}

/// [`decode`] with the payload limit taken from `config`.
pub fn decode_with_config(buffer: &[u8], config: &FrameConfig) -> Result<(Vec<Bytes>, Bytes)> {
    let mut src = BytesMut::from(buffer);
    let mut frames = Vec::new();
    while let Some(frame) = decode_frame(&mut src, config.max_payload_size)? {
        frames.push(frame);
    }
    Ok((frames, src.freeze()))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
