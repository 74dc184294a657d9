//! Transport abstraction consumed by the engine.
//!
//! A [`Connector`] opens channels; a [`Channel`] accepts outgoing bytes and can be closed.
//! Everything the transport observes (open, inbound bytes, close, error) comes back to the
//! engine as a [`ChannelEvent`] tagged with the [`ChannelId`] it was opened with, so events
//! from a channel the engine already abandoned can be recognised and dropped.

use std::fmt;

use bytes::Bytes;

use crate::error::ChannelError;

/// Identifies one opened channel for the lifetime of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// WebSocket-style close status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Clean shutdown; the engine does not reconnect after it.
    pub const NORMAL: CloseCode = CloseCode(1000);
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    pub const PROTOCOL_ERROR: CloseCode = CloseCode(1002);
    /// Connection dropped without a close frame.
    pub const ABNORMAL: CloseCode = CloseCode(1006);

    pub fn is_normal(self) -> bool {
        self == Self::NORMAL
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something the transport observed on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub id: ChannelId,
    pub kind: ChannelEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEventKind {
    Opened,
    Received(Bytes),
    Closed(CloseCode),
    Error(String),
}

impl ChannelEvent {
    pub fn opened(id: ChannelId) -> Self {
        Self {
            id,
            kind: ChannelEventKind::Opened,
        }
    }

    pub fn received(id: ChannelId, bytes: impl Into<Bytes>) -> Self {
        Self {
            id,
            kind: ChannelEventKind::Received(bytes.into()),
        }
    }

    pub fn closed(id: ChannelId, code: CloseCode) -> Self {
        Self {
            id,
            kind: ChannelEventKind::Closed(code),
        }
    }

    pub fn error(id: ChannelId, reason: impl Into<String>) -> Self {
        Self {
            id,
            kind: ChannelEventKind::Error(reason.into()),
        }
    }
}

/// One duplex byte channel.
pub trait Channel {
    fn id(&self) -> ChannelId;

    /// Queue `frame` for transmission. Must not block.
    fn send(&mut self, frame: Bytes) -> Result<(), ChannelError>;

    /// Begin closing the channel. Idempotent.
    fn close(&mut self, code: CloseCode);
}

/// Opens channels to the server.
pub trait Connector {
    type Channel: Channel;

    /// Start opening a channel to `url`.
    ///
    /// Returning `Ok` means the attempt is under way; the transport reports
    /// [`ChannelEventKind::Opened`] once it is usable.
    fn open(&mut self, id: ChannelId, url: &str) -> Result<Self::Channel, ChannelError>;
}
