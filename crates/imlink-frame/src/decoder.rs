use bytes::{Bytes, BytesMut};

use crate::codec::{decode_frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Incremental frame decoder over a push-based byte source.
///
/// Each chunk handed to [`FrameDecoder::push`] is appended to an internal receive
/// buffer; every complete frame is drained in arrival order and any trailing partial
/// frame (prefix or body) stays buffered until more bytes arrive.
///
/// A fault found after complete frames does not discard them: the frames are returned
/// and the fault is held until [`take_fault`](FrameDecoder::take_fault) or the next push.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    config: FrameConfig,
    fault: Option<FrameError>,
}

impl FrameDecoder {
    /// Create a decoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a decoder with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            fault: None,
        }
    }

    /// Append `chunk` and return every frame that is now complete.
    ///
    /// Returns an error only when no frame precedes the fault in this chunk, or when a
    /// held fault is still pending. After any fault the stream is out of sync; callers
    /// should [`clear`](Self::clear) the decoder and usually drop the channel.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>> {
        if let Some(err) = self.fault.take() {
            return Err(err);
        }
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            match decode_frame(&mut self.buf, self.config.max_payload_size) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(err) if frames.is_empty() => return Err(err),
                Err(err) => {
                    tracing::debug!(
                        decoded = frames.len(),
                        error = %err,
                        "framing fault after complete frames"
                    );
                    self.fault = Some(err);
                    break;
                }
            }
        }

        if !self.buf.is_empty() {
            tracing::trace!(buffered = self.buf.len(), "partial frame buffered");
        }
        Ok(frames)
    }

    /// The fault held back by the last [`push`](Self::push), if any.
    pub fn take_fault(&mut self) -> Option<FrameError> {
        self.fault.take()
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any buffered partial frame and any held fault.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.fault = None;
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
