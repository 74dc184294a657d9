//! WebSocket transport over tokio-tungstenite.
//!
//! Each opened channel gets its own task that owns the socket. Frames reach the task over
//! an unbounded queue; everything the socket reports goes to the shared event queue
//! returned by [`WsConnector::new`], ready for [`Driver::spawn`](crate::driver::Driver::spawn).

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};

use crate::connector::{Channel, ChannelEvent, ChannelId, CloseCode, Connector};
use crate::error::ChannelError;

/// Close code reported when the peer's close frame carried no status.
const NO_STATUS: CloseCode = CloseCode(1005);

enum Outbound {
    Frame(Bytes),
    Close(CloseCode),
}

/// Opens WebSocket channels on the current tokio runtime.
#[derive(Debug, Clone)]
pub struct WsConnector {
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl WsConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }
}

impl Connector for WsConnector {
    type Channel = WsChannel;

    fn open(&mut self, id: ChannelId, url: &str) -> Result<WsChannel, ChannelError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|err| ChannelError::Open {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

        let (outbound, rx) = mpsc::unbounded_channel();
        runtime.spawn(run_channel(id, url.to_string(), rx, self.events.clone()));
        Ok(WsChannel {
            id,
            outbound,
            closed: false,
        })
    }
}

/// Handle to one socket task.
#[derive(Debug)]
pub struct WsChannel {
    id: ChannelId,
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: bool,
}

impl Channel for WsChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn send(&mut self, frame: Bytes) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| ChannelError::Closed)
    }

    fn close(&mut self, code: CloseCode) {
        if !std::mem::replace(&mut self.closed, true) {
            let _ = self.outbound.send(Outbound::Close(code));
        }
    }
}

async fn run_channel(
    id: ChannelId,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(err) => {
            tracing::debug!(channel = %id, error = %err, "websocket connect failed");
            let _ = events.send(ChannelEvent::error(id, err.to_string()));
            return;
        }
    };
    tracing::debug!(channel = %id, "websocket open");
    let _ = events.send(ChannelEvent::opened(id));

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Frame(frame)) => {
                    if let Err(err) = sink.send(Message::binary(frame.to_vec())).await {
                        let _ = events.send(ChannelEvent::error(id, err.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close(code)) => {
                    let frame = CloseFrame {
                        code: WsCloseCode::from(code.0),
                        reason: "".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    let _ = sink.close().await;
                    break;
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Binary(data))) => {
                    let _ = events.send(ChannelEvent::received(id, Bytes::from(data)));
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| CloseCode(f.code.into())).unwrap_or(NO_STATUS);
                    tracing::debug!(channel = %id, %code, "websocket closed by peer");
                    let _ = events.send(ChannelEvent::closed(id, code));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    let _ = events.send(ChannelEvent::error(id, err.to_string()));
                    break;
                }
                None => {
                    let _ = events.send(ChannelEvent::closed(id, CloseCode::ABNORMAL));
                    break;
                }
            },
        }
    }
    tracing::debug!(channel = %id, "websocket task finished");
}
