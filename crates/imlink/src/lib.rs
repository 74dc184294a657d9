//! Client side of a persistent-connection instant-messaging protocol.
//!
//! imlink keeps one long-lived channel to a messaging server healthy: length-prefixed
//! framing, a protobuf envelope, heartbeats, reconnection with signed handshake
//! parameters, resend while offline and `seq` to `msgId` acknowledgement tracking.
//!
//! # Crate Structure
//!
//! - [`frame`]: varint length-prefix framing and the incremental decoder
//! - [`proto`]: envelope schema, message types and content-type flags
//! - [`engine`]: the connection engine and its timers (async driver behind `async`)

/// Re-export frame types.
pub mod frame {
    pub use imlink_frame::*;
}

/// Re-export envelope types.
pub mod proto {
    pub use imlink_proto::*;
}

/// Re-export engine types.
pub mod engine {
    pub use imlink_engine::*;
}
