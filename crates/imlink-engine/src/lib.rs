//! Connection engine for the imlink messaging protocol.
//!
//! [`ConnectionEngine`] owns one logical channel to the server and keeps it healthy:
//! heartbeat probes, automatic reconnection with fresh credentials, resend of
//! client-originated messages while the channel is down, and re-association of each
//! sent `seq` with the `msgId` the server assigns on DELIVERED.
//!
//! The engine is sans-IO. Callers feed it [`ChannelEvent`]s and the current time and ask
//! [`ConnectionEngine::poll_timeout`] when to wake it next. With the `async` feature,
//! [`driver::Driver`] runs it on a tokio task and [`ws::WsConnector`] supplies WebSocket
//! channels.

pub mod config;
pub mod connector;
pub mod engine;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod heartbeat;
pub mod pending_ack;
pub mod reconnect;
pub mod send_agent;

#[cfg(feature = "async")]
pub mod driver;
#[cfg(feature = "async")]
pub mod ws;

pub use config::{EngineConfig, HeartbeatConfig, ReconnectConfig, ResendConfig};
pub use connector::{
    Channel, ChannelEvent, ChannelEventKind, ChannelId, CloseCode, Connector,
};
pub use engine::{ConnectionEngine, ConnectionState, SendReceipt};
pub use error::{AuthError, ChannelError, EngineError, Result};
pub use handler::{Handler, HandlerTable};
pub use handshake::{sign, AuthProvider, HandshakeParams, StaticAuth};
pub use heartbeat::{HeartbeatMonitor, HeartbeatTick};
pub use pending_ack::{AckCallback, PendingAckTracker};
pub use reconnect::ReconnectScheduler;
pub use send_agent::{DeliveryFailure, OutgoingFrame, SendAgent, SendOutcome};

#[cfg(feature = "async")]
pub use driver::{Driver, EngineHandle};
#[cfg(feature = "async")]
pub use ws::WsConnector;
