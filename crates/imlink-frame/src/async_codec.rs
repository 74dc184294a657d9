//! `tokio_util::codec` adapter for varint-prefixed frames.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, FrameConfig};
use crate::error::FrameError;

/// Stream codec yielding one `Bytes` payload per frame.
#[derive(Debug, Clone, Default)]
pub struct VarintCodec {
    config: FrameConfig,
}

impl VarintCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }
}

impl Decoder for VarintCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, self.config.max_payload_size)
    }
}

impl Encoder<Bytes> for VarintCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: item.len() as u64,
                max: self.config.max_payload_size,
            });
        }
        encode_frame(&item, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::Framed;

    use super::*;

    #[tokio::test]
    async fn framed_duplex_roundtrip() {
        let (left, right) = tokio::io::duplex(4096);
        let mut writer = Framed::new(left, VarintCodec::new());
        let mut reader = Framed::new(right, VarintCodec::new());

        let big = Bytes::from(vec![0x42u8; 1000]);
        writer.send(Bytes::from_static(b"ping")).await.unwrap();
        writer.send(big.clone()).await.unwrap();

        let first = reader.next().await.unwrap().unwrap();
        let second = reader.next().await.unwrap().unwrap();
        assert_eq!(first.as_ref(), b"ping");
        assert_eq!(second, big);
    }

    #[test]
    fn encoder_rejects_oversized_payload() {
        let mut codec = VarintCodec::with_config(FrameConfig {
            max_payload_size: 2,
        });
        let mut dst = BytesMut::new();
        let err = codec
            .encode(Bytes::from_static(b"abc"), &mut dst)
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 3, max: 2 }));
        assert!(dst.is_empty());
    }
}
