use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use bytes::Bytes;

use crate::codec::FrameConfig;
use crate::decoder::FrameDecoder;
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Pulls frame payloads out of a blocking byte stream, such as a capture file or stdin.
///
/// Iterating yields payloads until a clean end of stream. A stream that ends inside a
/// frame yields [`FrameError::ConnectionClosed`].
pub struct FrameReader<R> {
    source: R,
    decoder: FrameDecoder,
    pending: VecDeque<Bytes>,
    chunk: Box<[u8]>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(source: R) -> Self {
        Self::with_config(source, FrameConfig::default())
    }

    pub fn with_config(source: R, config: FrameConfig) -> Self {
        Self {
            source,
            decoder: FrameDecoder::with_config(config),
            pending: VecDeque::new(),
            chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
        }
    }

    /// Next payload, or `None` at a clean end of stream.
    pub fn read_frame(&mut self) -> Result<Option<Bytes>> {
        while self.pending.is_empty() {
            if let Some(err) = self.decoder.take_fault() {
                return Err(err);
            }
            let read = match self.source.read(&mut self.chunk) {
                Ok(0) if self.decoder.buffered() > 0 => return Err(FrameError::ConnectionClosed),
                Ok(0) => return Ok(None),
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            self.pending.extend(self.decoder.push(&self.chunk[..read])?);
        }
        Ok(self.pending.pop_front())
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::encode;

    /// Hands out at most `step` bytes per read, interrupting before every read.
    struct Trickle {
        bytes: Vec<u8>,
        pos: usize,
        step: usize,
        interrupt: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(ErrorKind::Interrupted.into());
            }
            let n = self.step.min(buf.len()).min(self.bytes.len() - self.pos);
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn stream(payloads: &[&[u8]]) -> Vec<u8> {
        payloads.iter().flat_map(|p| encode(p).to_vec()).collect()
    }

    #[test]
    fn iterates_payloads_until_eof() {
        let wire = stream(&[b"hello", b"", b"world"]);
        let frames: Vec<Bytes> = FrameReader::new(Cursor::new(wire))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(frames, vec![Bytes::from("hello"), Bytes::new(), Bytes::from("world")]);
    }

    #[test]
    fn trickled_and_interrupted_reads() {
        let big = vec![0x5a; 300];
        let wire = stream(&[b"ab", &big]);
        let mut reader = FrameReader::new(Trickle {
            bytes: wire,
            pos: 0,
            step: 1,
            interrupt: false,
        });
        assert_eq!(reader.read_frame().unwrap().unwrap().as_ref(), b"ab");
        assert_eq!(reader.read_frame().unwrap().unwrap().len(), 300);
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn eof_inside_frame_is_connection_closed() {
        let mut wire = stream(&[b"complete"]);
        wire.extend_from_slice(&[0x09, b'p', b'a']);

        let mut reader = FrameReader::new(Cursor::new(wire));
        assert!(reader.read_frame().unwrap().is_some());
        assert!(matches!(reader.read_frame(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn frames_before_corruption_are_yielded() {
        let mut wire = stream(&[b"first", b"second"]);
        wire.extend_from_slice(&[0xff; 11]);

        let mut reader = FrameReader::new(Cursor::new(wire));
        assert_eq!(reader.read_frame().unwrap().unwrap().as_ref(), b"first");
        assert_eq!(reader.read_frame().unwrap().unwrap().as_ref(), b"second");
        assert!(matches!(reader.read_frame(), Err(FrameError::LengthOverflow)));
    }

    #[test]
    fn limit_applies_to_stream() {
        let wire = stream(&[&[0u8; 32]]);
        let mut reader = FrameReader::with_config(
            Cursor::new(wire),
            FrameConfig {
                max_payload_size: 8,
            },
        );
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::PayloadTooLarge { size: 32, max: 8 })
        ));
    }
}
