use std::fmt;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use bytes::Bytes;
use imlink_frame::{FrameConfig, FrameDecoder, FrameError};
use imlink_proto::{
    decode_envelope, envelope_frame, new_seq, Envelope, MessageType, OutboundMessage, Sender,
    Target,
};
use serde::Serialize;

use crate::config::{deadline, EngineConfig};
use crate::connector::{Channel, ChannelEvent, ChannelEventKind, ChannelId, CloseCode, Connector};
use crate::error::{EngineError, Result};
use crate::handler::{Handler, HandlerTable};
use crate::handshake::{AuthProvider, HandshakeParams};
use crate::heartbeat::{HeartbeatMonitor, HeartbeatTick};
use crate::pending_ack::PendingAckTracker;
use crate::reconnect::ReconnectScheduler;
use crate::send_agent::{DeliveryFailure, OutgoingFrame, SendAgent, SendOutcome};

type FailureHandler = Arc<dyn Fn(&DeliveryFailure) + Send + Sync>;

/// Connection lifecycle as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    /// Channel opening or HELLO sent; waiting for the HELLO reply.
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        })
    }
}

/// Returned by [`ConnectionEngine::send_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub seq: String,
    pub outcome: SendOutcome,
}

/// The connection/protocol engine.
///
/// Owns the channel, the receive buffer and every timer. All methods take the current
/// [`Instant`]; nothing here sleeps or spawns. Drive it by forwarding channel events to
/// [`handle_event`](Self::handle_event) and calling [`handle_timeout`](Self::handle_timeout)
/// whenever [`poll_timeout`](Self::poll_timeout) comes due.
pub struct ConnectionEngine<K: Connector, A: AuthProvider> {
    config: EngineConfig,
    endpoint: String,
    sender: Sender,
    auth: A,
    connector: K,

    state: ConnectionState,
    channel: Option<K::Channel>,
    next_channel: u64,
    decoder: FrameDecoder,
    handshake_deadline: Option<Instant>,

    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectScheduler,
    acks: PendingAckTracker,
    agent: SendAgent,

    handlers: HandlerTable,
    on_delivery_failure: Option<FailureHandler>,
}

impl<K: Connector, A: AuthProvider> ConnectionEngine<K, A> {
    /// Create a disconnected engine for one session.
    ///
    /// `endpoint` is the channel URL without the handshake query; `sender` is stamped on
    /// every data message.
    pub fn new(
        config: EngineConfig,
        endpoint: impl Into<String>,
        sender: Sender,
        auth: A,
        connector: K,
    ) -> Self {
        let decoder = FrameDecoder::with_config(FrameConfig {
            max_payload_size: config.max_frame_payload,
        });
        Self {
            heartbeat: HeartbeatMonitor::new(config.heartbeat.clone()),
            reconnect: ReconnectScheduler::new(config.reconnect.clone()),
            acks: PendingAckTracker::new(config.ack_grace),
            agent: SendAgent::new(config.resend.clone()),
            config,
            endpoint: endpoint.into(),
            sender,
            auth,
            connector,
            state: ConnectionState::Disconnected,
            channel: None,
            next_channel: 1,
            decoder,
            handshake_deadline: None,
            handlers: HandlerTable::new(),
            on_delivery_failure: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    /// Id of the channel the engine currently owns.
    pub fn channel_id(&self) -> Option<ChannelId> {
        self.channel.as_ref().map(Channel::id)
    }

    pub fn heartbeat(&self) -> &HeartbeatMonitor {
        &self.heartbeat
    }

    pub fn reconnect(&self) -> &ReconnectScheduler {
        &self.reconnect
    }

    pub fn pending_acks(&self) -> &PendingAckTracker {
        &self.acks
    }

    pub fn send_agent(&self) -> &SendAgent {
        &self.agent
    }

    /// Start a connection attempt. Does nothing unless disconnected.
    ///
    /// Each attempt fetches fresh credentials and a fresh signed handshake. Failures are
    /// logged and handed to the reconnect scheduler.
    pub fn connect(&mut self, now: Instant) {
        if self.state != ConnectionState::Disconnected {
            return;
        }

        let params = match HandshakeParams::generate(&self.auth, SystemTime::now()) {
            Ok(params) => params,
            Err(err) => {
                self.handshake_failed(EngineError::Auth(err), now);
                return;
            }
        };

        let id = ChannelId(self.next_channel);
        self.next_channel += 1;
        tracing::debug!(channel = %id, ?params, endpoint = %self.endpoint, "opening channel");

        match self.connector.open(id, &params.channel_url(&self.endpoint)) {
            Ok(channel) => {
                self.channel = Some(channel);
                self.state = ConnectionState::Connecting;
                self.handshake_deadline = Some(deadline(now, self.config.handshake_timeout));
                tracing::info!(channel = %id, "connecting");
            }
            Err(err) => self.handshake_failed(EngineError::Channel(err), now),
        }
    }

    /// Close the channel cleanly and stop heartbeat and reconnection.
    ///
    /// Resends already scheduled stay scheduled; they are written if the caller connects
    /// again in time.
    pub fn disconnect(&mut self) {
        self.reconnect.stop();
        self.abort_channel(CloseCode::NORMAL);
        tracing::info!("disconnected by client");
    }

    /// Feed one transport event. Events from channels the engine no longer owns are
    /// dropped.
    pub fn handle_event(&mut self, event: ChannelEvent, now: Instant) {
        if self.channel_id() != Some(event.id) {
            tracing::debug!(channel = %event.id, "dropping event from stale channel");
            return;
        }
        match event.kind {
            ChannelEventKind::Opened => self.handle_open(now),
            ChannelEventKind::Received(bytes) => self.handle_receive(&bytes, now),
            ChannelEventKind::Closed(code) => self.handle_close(code, now),
            ChannelEventKind::Error(reason) => self.handle_error(&reason, now),
        }
    }

    /// The current channel is usable: send HELLO.
    pub fn handle_open(&mut self, _now: Instant) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        match channel.send(envelope_frame(&Envelope::hello())) {
            Ok(()) => tracing::debug!(channel = %channel.id(), "HELLO sent"),
            Err(err) => tracing::warn!(channel = %channel.id(), error = %err, "failed to send HELLO"),
        }
    }

    /// Bytes arrived on the current channel.
    ///
    /// Frames that arrived complete ahead of a framing fault are dispatched before the
    /// channel is dropped.
    pub fn handle_receive(&mut self, bytes: &[u8], now: Instant) {
        let frames = match self.decoder.push(bytes) {
            Ok(frames) => frames,
            Err(err) => return self.framing_fault(err, now),
        };

        for frame in frames {
            match decode_envelope(&frame) {
                Ok(envelope) => self.dispatch(envelope, now),
                Err(err) => {
                    tracing::warn!(error = %EngineError::from(err), len = frame.len(), "dropping frame")
                }
            }
        }

        if let Some(err) = self.decoder.take_fault() {
            self.framing_fault(err, now);
        }
    }

    fn framing_fault(&mut self, err: FrameError, now: Instant) {
        tracing::warn!(error = %EngineError::Frame(err), "framing fault, dropping channel");
        self.abort_channel(CloseCode::PROTOCOL_ERROR);
        self.reconnect.start(now);
    }

    /// The current channel closed. Anything but a clean close schedules a reconnect.
    pub fn handle_close(&mut self, code: CloseCode, now: Instant) {
        self.release_channel();
        if code.is_normal() {
            tracing::info!(%code, "channel closed");
        } else {
            tracing::info!(%code, "channel closed abnormally, will reconnect");
            self.reconnect.start(now);
        }
    }

    /// The current channel failed. Always schedules a reconnect.
    pub fn handle_error(&mut self, reason: &str, now: Instant) {
        tracing::warn!(reason, "channel error, will reconnect");
        self.release_channel();
        self.reconnect.start(now);
    }

    /// Send a CHAT, GROUP_CHAT or AT message with at-least-once delivery.
    ///
    /// `before` sees the built envelope synchronously. `after` receives the server's
    /// `msgId` for every DELIVERED matching the seq. When the channel is down the send is
    /// retried on the resend timer; if the shared retry budget is already spent, this
    /// returns [`EngineError::DeliveryExhausted`].
    pub fn send_message<B, F>(
        &mut self,
        message: OutboundMessage,
        before: B,
        after: F,
        now: Instant,
    ) -> Result<SendReceipt>
    where
        B: FnOnce(&Envelope),
        F: FnMut(u64) + Send + 'static,
    {
        let seq = message.seq.clone().unwrap_or_else(new_seq);
        let message = message.with_seq(seq.clone());
        let envelope = Envelope::outbound(&self.sender, &message)?;

        before(&envelope);
        self.acks.register(seq.clone(), Box::new(after));

        let item = OutgoingFrame {
            seq: seq.clone(),
            message_type: message.msg_type,
            frame: envelope_frame(&envelope),
        };
        match self.submit(item, now) {
            Ok(outcome) => Ok(SendReceipt { seq, outcome }),
            Err(failure) => Err(EngineError::DeliveryExhausted {
                seq: failure.seq,
                message_type: failure.message_type,
                attempts: failure.attempts,
            }),
        }
    }

    /// Report that the conversation with `target` was read up to `content`.
    ///
    /// Written only while connected; never retried.
    pub fn send_read_receipt(
        &mut self,
        target: &Target,
        session_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<()> {
        let envelope = Envelope::read_receipt(&self.sender, target, session_id, content);
        self.write_now(&envelope)
    }

    /// Ask for the presence of `accounts`. An empty list sends nothing.
    pub fn request_status<S: AsRef<str>>(&mut self, accounts: &[S]) -> Result<()> {
        if accounts.is_empty() {
            return Ok(());
        }
        let envelope = Envelope::status_request(&self.sender, accounts)?;
        self.write_now(&envelope)
    }

    /// Publish this client's own status.
    pub fn sync_status(&mut self, status: impl fmt::Display) -> Result<()> {
        let envelope = Envelope::status_sync(&self.sender, status);
        self.write_now(&envelope)
    }

    /// Route envelopes of `msg_type` to `handler`, replacing any previous binding.
    pub fn subscribe<H: Handler + 'static>(&mut self, msg_type: MessageType, handler: H) {
        self.handlers.bind(msg_type, Arc::new(handler));
    }

    /// Route every SYS_GROUP_* notification to one handler.
    pub fn subscribe_group_system<H: Handler + 'static>(&mut self, handler: H) {
        self.handlers
            .bind_all(&MessageType::GROUP_SYSTEM, Arc::new(handler));
    }

    pub fn unsubscribe(&mut self, msg_type: MessageType) -> bool {
        self.handlers.unbind(msg_type)
    }

    /// Direct access to the routing table, for binding shared handlers.
    pub fn handlers_mut(&mut self) -> &mut HandlerTable {
        &mut self.handlers
    }

    /// Called when a deferred send runs out of retries on the resend timer.
    pub fn on_delivery_failure<F>(&mut self, handler: F)
    where
        F: Fn(&DeliveryFailure) + Send + Sync + 'static,
    {
        self.on_delivery_failure = Some(Arc::new(handler));
    }

    /// Earliest instant at which [`handle_timeout`](Self::handle_timeout) has work.
    pub fn poll_timeout(&self) -> Option<Instant> {
        [
            self.heartbeat.poll_timeout(),
            self.reconnect.poll_timeout(),
            self.handshake_deadline,
            self.agent.poll_timeout(),
            self.acks.poll_timeout(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Run every timer that is due: heartbeat, reconnect, handshake deadline, resends,
    /// then ack evictions.
    pub fn handle_timeout(&mut self, now: Instant) {
        match self.heartbeat.handle_timeout(now) {
            Some(HeartbeatTick::Probe) => self.send_probe(),
            Some(HeartbeatTick::Expired { unanswered }) => {
                tracing::warn!(
                    error = %EngineError::HeartbeatTimeout(unanswered),
                    "channel presumed dead"
                );
                self.abort_channel(CloseCode::GOING_AWAY);
                self.reconnect.start(now);
            }
            None => {}
        }

        if self.reconnect.handle_timeout(now) {
            match self.state {
                ConnectionState::Disconnected => {
                    tracing::info!("reconnecting");
                    self.connect(now);
                }
                ConnectionState::Connected => self.reconnect.stop(),
                ConnectionState::Connecting => {
                    tracing::debug!("connection attempt in progress, skipping reconnect tick")
                }
            }
        }

        if self.handshake_deadline.is_some_and(|deadline| deadline <= now) {
            let err = EngineError::HandshakeFailure(format!(
                "no HELLO reply within {:?}",
                self.config.handshake_timeout
            ));
            self.abort_channel(CloseCode::GOING_AWAY);
            self.handshake_failed(err, now);
        }

        let connected = self.state == ConnectionState::Connected;
        let channel = &mut self.channel;
        let failures = self
            .agent
            .handle_timeout(now, |frame| write_frame(connected, channel, frame));
        for failure in failures {
            tracing::warn!(
                seq = %failure.seq,
                msg_type = %failure.message_type,
                attempts = failure.attempts,
                "delivery exhausted"
            );
            if let Some(handler) = &self.on_delivery_failure {
                handler(&failure);
            }
        }

        self.acks.handle_timeout(now);
    }

    fn dispatch(&mut self, envelope: Envelope, now: Instant) {
        let Some(msg_type) = envelope.message_type() else {
            tracing::debug!(msg_type = envelope.header.msg_type, "ignoring unknown message type");
            return;
        };
        tracing::debug!(%msg_type, "received");

        match msg_type {
            MessageType::Hello => self.on_hello(now),
            MessageType::HeartBeat => self.heartbeat.on_reply(),
            MessageType::Delivered => self.on_delivered(&envelope, now),
            _ => {}
        }

        if !self.handlers.dispatch(msg_type, &envelope) {
            tracing::trace!(%msg_type, "no handler bound");
        }
    }

    fn on_hello(&mut self, now: Instant) {
        if self.state != ConnectionState::Connecting {
            tracing::debug!(state = %self.state, "ignoring unexpected HELLO");
            return;
        }
        self.state = ConnectionState::Connected;
        self.handshake_deadline = None;
        self.heartbeat.start(now);
        tracing::info!(channel = ?self.channel_id(), "connected");
    }

    fn on_delivered(&mut self, envelope: &Envelope, now: Instant) {
        match (envelope.seq(), envelope.msg_id()) {
            (Some(seq), Some(msg_id)) => {
                if !self.acks.resolve(seq, msg_id, now) {
                    tracing::debug!(seq, msg_id, "DELIVERED for unknown seq");
                }
            }
            _ => tracing::warn!("DELIVERED without seq or msgId"),
        }
    }

    fn send_probe(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        if let Some(channel) = self.channel.as_mut() {
            if let Err(err) = channel.send(envelope_frame(&Envelope::heartbeat())) {
                tracing::debug!(error = %err, "heartbeat probe not written");
            }
        }
    }

    fn submit(
        &mut self,
        item: OutgoingFrame,
        now: Instant,
    ) -> std::result::Result<SendOutcome, DeliveryFailure> {
        let connected = self.state == ConnectionState::Connected;
        let channel = &mut self.channel;
        self.agent
            .submit(item, now, |frame| write_frame(connected, channel, frame))
    }

    fn write_now(&mut self, envelope: &Envelope) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(EngineError::ChannelUnavailable);
        }
        let channel = self.channel.as_mut().ok_or(EngineError::ChannelUnavailable)?;
        channel.send(envelope_frame(envelope))?;
        Ok(())
    }

    fn handshake_failed(&mut self, err: EngineError, now: Instant) {
        tracing::warn!(error = %err, "handshake failed, will retry");
        self.reconnect.start(now);
    }

    /// Close the current channel with `code` and forget it.
    fn abort_channel(&mut self, code: CloseCode) {
        if let Some(channel) = self.channel.as_mut() {
            channel.close(code);
        }
        self.release_channel();
    }

    /// Forget the current channel without closing it.
    fn release_channel(&mut self) {
        self.heartbeat.stop();
        self.channel = None;
        self.decoder.clear();
        self.handshake_deadline = None;
        self.state = ConnectionState::Disconnected;
    }
}

fn write_frame<C: Channel>(connected: bool, channel: &mut Option<C>, frame: &Bytes) -> bool {
    if !connected {
        return false;
    }
    let Some(channel) = channel.as_mut() else {
        return false;
    };
    match channel.send(frame.clone()) {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(error = %err, "write failed, treating channel as unavailable");
            false
        }
    }
}

impl<K: Connector, A: AuthProvider> fmt::Debug for ConnectionEngine<K, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionEngine")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("channel", &self.channel_id())
            .field("heartbeat", &self.heartbeat)
            .field("reconnect", &self.reconnect)
            .field("acks", &self.acks)
            .field("agent", &self.agent)
            .field("handlers", &self.handlers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use bytes::BytesMut;
    use imlink_proto::{content, Body, Header};

    use super::*;
    use crate::error::{AuthError, ChannelError};
    use crate::handshake::StaticAuth;

    #[derive(Default, Clone)]
    struct Wire {
        opened: Arc<Mutex<Vec<(ChannelId, String)>>>,
        sent: Arc<Mutex<Vec<(ChannelId, Bytes)>>>,
        closed: Arc<Mutex<Vec<(ChannelId, CloseCode)>>>,
        refuse_open: Arc<AtomicBool>,
        refuse_send: Arc<AtomicBool>,
    }

    impl Wire {
        fn opens(&self) -> usize {
            self.opened.lock().unwrap().len()
        }

        fn sent_types(&self) -> Vec<MessageType> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .flat_map(|(_, bytes)| imlink_frame::decode(bytes).unwrap().0)
                .map(|payload| decode_envelope(&payload).unwrap().message_type().unwrap())
                .collect()
        }

        fn closes(&self) -> Vec<CloseCode> {
            self.closed.lock().unwrap().iter().map(|(_, c)| *c).collect()
        }
    }

    struct MockConnector(Wire);

    struct MockChannel {
        id: ChannelId,
        wire: Wire,
    }

    impl Connector for MockConnector {
        type Channel = MockChannel;

        fn open(&mut self, id: ChannelId, url: &str) -> std::result::Result<MockChannel, ChannelError> {
            if self.0.refuse_open.load(Ordering::SeqCst) {
                return Err(ChannelError::Open {
                    url: url.to_string(),
                    reason: "refused".into(),
                });
            }
            self.0.opened.lock().unwrap().push((id, url.to_string()));
            Ok(MockChannel {
                id,
                wire: self.0.clone(),
            })
        }
    }

    impl Channel for MockChannel {
        fn id(&self) -> ChannelId {
            self.id
        }

        fn send(&mut self, frame: Bytes) -> std::result::Result<(), ChannelError> {
            if self.wire.refuse_send.load(Ordering::SeqCst) {
                return Err(ChannelError::Closed);
            }
            self.wire.sent.lock().unwrap().push((self.id, frame));
            Ok(())
        }

        fn close(&mut self, code: CloseCode) {
            self.wire.closed.lock().unwrap().push((self.id, code));
        }
    }

    struct FailingAuth;

    impl AuthProvider for FailingAuth {
        fn access_token(&self) -> std::result::Result<String, AuthError> {
            Err(AuthError::TokenUnavailable("logged out".into()))
        }

        fn signing_secret(&self) -> std::result::Result<String, AuthError> {
            Ok("secret".into())
        }
    }

    type TestEngine = ConnectionEngine<MockConnector, StaticAuth>;

    fn engine() -> (TestEngine, Wire) {
        let wire = Wire::default();
        let engine = ConnectionEngine::new(
            EngineConfig::default(),
            "wss://im.example/ws",
            Sender::new("alice", "client-1"),
            StaticAuth::new("tok", "secret"),
            MockConnector(wire.clone()),
        );
        (engine, wire)
    }

    fn frame_of(envelope: &Envelope) -> Bytes {
        envelope_frame(envelope)
    }

    fn delivered(seq: &str, msg_id: u64) -> Envelope {
        Envelope {
            header: Header::new(MessageType::Delivered),
            body: Some(Body {
                seq: Some(seq.into()),
                msg_id: Some(msg_id),
                ..Body::default()
            }),
        }
    }

    fn connected_engine(t0: Instant) -> (TestEngine, Wire) {
        let (mut engine, wire) = engine();
        engine.connect(t0);
        let id = engine.channel_id().unwrap();
        engine.handle_event(ChannelEvent::opened(id), t0);
        engine.handle_event(ChannelEvent::received(id, frame_of(&Envelope::hello())), t0);
        assert_eq!(engine.state(), ConnectionState::Connected);
        (engine, wire)
    }

    fn chat() -> OutboundMessage {
        OutboundMessage::chat("bob", "s-1", "hi", content::TEXT)
    }

    #[test]
    fn connect_opens_signed_url_and_sends_hello() {
        let t0 = Instant::now();
        let (mut engine, wire) = engine();
        engine.connect(t0);
        assert_eq!(engine.state(), ConnectionState::Connecting);

        let (id, url) = wire.opened.lock().unwrap()[0].clone();
        assert!(url.starts_with("wss://im.example/ws?traceId="));
        assert!(url.contains("&sign="));
        assert!(url.ends_with("&token=tok"));

        engine.handle_event(ChannelEvent::opened(id), t0);
        assert_eq!(wire.sent_types(), vec![MessageType::Hello]);
        assert_eq!(engine.state(), ConnectionState::Connecting);

        // a second connect while connecting is a no-op
        engine.connect(t0);
        assert_eq!(wire.opens(), 1);
    }

    #[test]
    fn hello_reply_connects_and_starts_heartbeat() {
        let t0 = Instant::now();
        let (engine, _) = connected_engine(t0);
        assert!(engine.heartbeat().is_running());
        assert_eq!(
            engine.poll_timeout(),
            Some(t0 + engine.config().heartbeat.interval)
        );
    }

    #[test]
    fn unbounded_intervals_do_not_overflow_timers() {
        let t0 = Instant::now();
        let wire = Wire::default();
        let mut config = EngineConfig::default();
        config.heartbeat.interval = Duration::MAX;
        config.reconnect.interval = Duration::MAX;
        config.resend.interval = Duration::MAX;
        config.ack_grace = Duration::MAX;
        config.handshake_timeout = Duration::MAX;
        let mut engine = ConnectionEngine::new(
            config,
            "wss://im.example/ws",
            Sender::new("alice", "client-1"),
            StaticAuth::new("tok", "secret"),
            MockConnector(wire.clone()),
        );

        let receipt = engine.send_message(chat(), |_| {}, |_| {}, t0).unwrap();
        assert_eq!(receipt.outcome, SendOutcome::Deferred);

        engine.connect(t0);
        assert_eq!(engine.poll_timeout(), Some(t0 + crate::config::MAX_TIMER));
        let id = engine.channel_id().unwrap();
        engine.handle_event(ChannelEvent::opened(id), t0);
        engine.handle_event(ChannelEvent::received(id, frame_of(&Envelope::hello())), t0);
        engine.handle_event(
            ChannelEvent::received(id, frame_of(&delivered(&receipt.seq, 9))),
            t0,
        );
        engine.handle_event(ChannelEvent::closed(id, CloseCode::ABNORMAL), t0);

        assert!(engine.reconnect().is_running());
        engine.handle_timeout(t0 + Duration::from_secs(3600));
        assert_eq!(engine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn delivered_split_across_receives_resolves_in_order() {
        let t0 = Instant::now();
        let (mut engine, _) = connected_engine(t0);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for seq in ["a", "b", "c"] {
            let sink = Arc::clone(&seen);
            let seq_owned = seq.to_string();
            engine
                .send_message(
                    chat().with_seq(seq),
                    |_| {},
                    move |msg_id| sink.lock().unwrap().push((seq_owned.clone(), msg_id)),
                    t0,
                )
                .unwrap();
        }

        let mut wire = BytesMut::new();
        wire.extend_from_slice(&frame_of(&delivered("a", 101)));
        wire.extend_from_slice(&frame_of(&delivered("b", 102)));
        let split = wire.len() + 1;
        wire.extend_from_slice(&frame_of(&delivered("c", 103)));

        let id = engine.channel_id().unwrap();
        engine.handle_event(ChannelEvent::received(id, wire.split_to(split).freeze()), t0);
        assert_eq!(seen.lock().unwrap().len(), 2);
        engine.handle_event(ChannelEvent::received(id, wire.freeze()), t0);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("a".to_string(), 101),
                ("b".to_string(), 102),
                ("c".to_string(), 103)
            ]
        );
    }

    #[test]
    fn heartbeat_timeout_reconnects_once_per_interval() {
        let t0 = Instant::now();
        let (mut engine, wire) = connected_engine(t0);
        let beat = engine.config().heartbeat.interval;
        let retry = engine.config().reconnect.interval;

        let mut now = t0;
        for _ in 0..3 {
            now += beat;
            engine.handle_timeout(now);
        }
        assert_eq!(
            wire.sent_types(),
            vec![
                MessageType::Hello,
                MessageType::HeartBeat,
                MessageType::HeartBeat,
                MessageType::HeartBeat
            ]
        );
        assert_eq!(engine.state(), ConnectionState::Connected);

        now += beat;
        engine.handle_timeout(now);
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert_eq!(wire.closes(), vec![CloseCode::GOING_AWAY]);
        assert!(engine.reconnect().is_running());
        assert_eq!(wire.opens(), 1);

        engine.handle_timeout(now + retry - Duration::from_millis(1));
        assert_eq!(wire.opens(), 1);
        engine.handle_timeout(now + retry);
        assert_eq!(wire.opens(), 2);
        assert_eq!(engine.state(), ConnectionState::Connecting);

        // still connecting on the next tick: no concurrent attempt
        engine.handle_timeout(now + retry * 2);
        assert_eq!(wire.opens(), 2);
    }

    #[test]
    fn heartbeat_replies_keep_connection() {
        let t0 = Instant::now();
        let (mut engine, _) = connected_engine(t0);
        let id = engine.channel_id().unwrap();
        let beat = engine.config().heartbeat.interval;

        let mut now = t0;
        for _ in 0..10 {
            now += beat;
            engine.handle_timeout(now);
            engine.handle_event(ChannelEvent::received(id, frame_of(&Envelope::heartbeat())), now);
        }
        assert_eq!(engine.state(), ConnectionState::Connected);
        assert_eq!(engine.heartbeat().health_point(), 0);
    }

    #[test]
    fn reconnect_stops_once_connected() {
        let t0 = Instant::now();
        let (mut engine, _) = engine();
        engine.handle_error("boom", t0);
        assert!(engine.reconnect().is_running());

        let retry = engine.config().reconnect.interval;
        engine.handle_timeout(t0 + retry);
        let id = engine.channel_id().unwrap();
        engine.handle_event(ChannelEvent::opened(id), t0 + retry);
        engine.handle_event(
            ChannelEvent::received(id, frame_of(&Envelope::hello())),
            t0 + retry,
        );
        assert_eq!(engine.state(), ConnectionState::Connected);

        engine.handle_timeout(t0 + retry * 2);
        assert!(!engine.reconnect().is_running());
    }

    #[test]
    fn deferred_send_written_after_reconnect() {
        let t0 = Instant::now();
        let (mut engine, wire) = engine();
        let resend = engine.config().resend.interval;

        let receipt = engine.send_message(chat(), |_| {}, |_| {}, t0).unwrap();
        assert_eq!(receipt.outcome, SendOutcome::Deferred);
        assert_eq!(engine.send_agent().pending(), 1);

        engine.connect(t0);
        let id = engine.channel_id().unwrap();
        engine.handle_event(ChannelEvent::opened(id), t0);
        engine.handle_event(ChannelEvent::received(id, frame_of(&Envelope::hello())), t0);

        engine.handle_timeout(t0 + resend);
        assert_eq!(wire.sent_types(), vec![MessageType::Hello, MessageType::Chat]);
        assert_eq!(engine.send_agent().pending(), 0);
    }

    #[test]
    fn exhaustion_reported_at_call_time() {
        let t0 = Instant::now();
        let (mut engine, _) = engine();
        for _ in 0..5 {
            engine.send_message(chat(), |_| {}, |_| {}, t0).unwrap();
        }
        let err = engine
            .send_message(chat().with_seq("last"), |_| {}, |_| {}, t0)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::DeliveryExhausted { ref seq, attempts: 5, .. } if seq == "last"
        ));
        assert_eq!(engine.send_agent().attempts(), 0);
    }

    #[test]
    fn exhaustion_in_timer_invokes_failure_handler() {
        let t0 = Instant::now();
        let (mut engine, _) = engine();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        engine.on_delivery_failure(move |f| sink.lock().unwrap().push(f.clone()));

        engine
            .send_message(chat().with_seq("x"), |_| {}, |_| {}, t0)
            .unwrap();
        let resend = engine.config().resend.interval;
        for n in 1..=5 {
            engine.handle_timeout(t0 + resend * n);
        }

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].seq, "x");
        assert_eq!(failures[0].message_type, MessageType::Chat);
    }

    #[test]
    fn failed_write_defers_send() {
        let t0 = Instant::now();
        let (mut engine, wire) = connected_engine(t0);
        wire.refuse_send.store(true, Ordering::SeqCst);

        let receipt = engine.send_message(chat(), |_| {}, |_| {}, t0).unwrap();
        assert_eq!(receipt.outcome, SendOutcome::Deferred);

        wire.refuse_send.store(false, Ordering::SeqCst);
        engine.handle_timeout(t0 + engine.config().resend.interval);
        assert_eq!(wire.sent_types(), vec![MessageType::Hello, MessageType::Chat]);
    }

    #[test]
    fn before_hook_sees_envelope_and_seq_is_generated() {
        let t0 = Instant::now();
        let (mut engine, _) = connected_engine(t0);
        let mut seen_seq = None;
        let receipt = engine
            .send_message(
                chat(),
                |env| seen_seq = env.seq().map(str::to_owned),
                |_| {},
                t0,
            )
            .unwrap();
        assert_eq!(receipt.outcome, SendOutcome::Written);
        assert_eq!(seen_seq.as_deref(), Some(receipt.seq.as_str()));
        assert!(engine.pending_acks().contains(&receipt.seq));
    }

    #[test]
    fn clean_close_does_not_reconnect() {
        let t0 = Instant::now();
        let (mut engine, _) = connected_engine(t0);
        let id = engine.channel_id().unwrap();
        engine.handle_event(ChannelEvent::closed(id, CloseCode::NORMAL), t0);

        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert!(!engine.heartbeat().is_running());
        assert!(!engine.reconnect().is_running());
    }

    #[test]
    fn abnormal_close_and_error_reconnect() {
        let t0 = Instant::now();
        let (mut engine, _) = connected_engine(t0);
        let id = engine.channel_id().unwrap();
        engine.handle_event(ChannelEvent::closed(id, CloseCode::GOING_AWAY), t0);
        assert!(engine.reconnect().is_running());

        let (mut engine, _) = connected_engine(t0);
        let id = engine.channel_id().unwrap();
        engine.handle_event(ChannelEvent::error(id, "reset by peer"), t0);
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert!(engine.reconnect().is_running());
    }

    #[test]
    fn stale_channel_events_are_dropped() {
        let t0 = Instant::now();
        let (mut engine, _) = connected_engine(t0);
        let old = engine.channel_id().unwrap();
        engine.handle_event(ChannelEvent::error(old, "gone"), t0);

        engine.connect(t0);
        let new = engine.channel_id().unwrap();
        assert_ne!(old, new);

        engine.handle_event(ChannelEvent::closed(old, CloseCode::GOING_AWAY), t0);
        assert_eq!(engine.state(), ConnectionState::Connecting);
        assert_eq!(engine.channel_id(), Some(new));
    }

    #[test]
    fn handshake_timeout_drops_channel_and_retries() {
        let t0 = Instant::now();
        let (mut engine, wire) = engine();
        engine.connect(t0);
        let id = engine.channel_id().unwrap();
        engine.handle_event(ChannelEvent::opened(id), t0);

        let timeout = engine.config().handshake_timeout;
        assert_eq!(engine.poll_timeout(), Some(t0 + timeout));
        engine.handle_timeout(t0 + timeout);

        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert_eq!(wire.closes(), vec![CloseCode::GOING_AWAY]);
        assert!(engine.reconnect().is_running());
    }

    #[test]
    fn framing_fault_drops_channel() {
        let t0 = Instant::now();
        let (mut engine, wire) = connected_engine(t0);
        let id = engine.channel_id().unwrap();

        engine.handle_event(ChannelEvent::received(id, vec![0xffu8; 11]), t0);

        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert_eq!(wire.closes(), vec![CloseCode::PROTOCOL_ERROR]);
        assert!(engine.reconnect().is_running());
    }

    #[test]
    fn malformed_and_mismatched_frames_are_dropped() {
        let t0 = Instant::now();
        let (mut engine, _) = connected_engine(t0);
        let id = engine.channel_id().unwrap();
        let acked = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&acked);
        engine
            .send_message(
                chat().with_seq("s-1"),
                |_| {},
                move |msg_id| sink.lock().unwrap().push(msg_id),
                t0,
            )
            .unwrap();
        let beats = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&beats);
        engine.subscribe(MessageType::HeartBeat, move |_: &Envelope| {
            *counter.lock().unwrap() += 1
        });

        let mut wrong = Envelope::heartbeat();
        wrong.header.magic = 1;
        let mut bytes = BytesMut::new();
        imlink_frame::encode_frame(&[0x0a, 0x05, 0x01], &mut bytes);
        bytes.extend_from_slice(&frame_of(&wrong));

        bytes.extend_from_slice(&frame_of(&delivered("s-1", 55)));
        bytes.extend_from_slice(&frame_of(&Envelope::heartbeat()));

        engine.handle_event(ChannelEvent::received(id, bytes.freeze()), t0);
        assert_eq!(engine.state(), ConnectionState::Connected);
        assert_eq!(*acked.lock().unwrap(), vec![55]);
        assert_eq!(*beats.lock().unwrap(), 1);
    }

    #[test]
    fn frames_ahead_of_framing_fault_are_dispatched() {
        let t0 = Instant::now();
        let (mut engine, wire) = connected_engine(t0);
        let id = engine.channel_id().unwrap();
        let acked = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&acked);
        engine
            .send_message(
                chat().with_seq("a"),
                |_| {},
                move |msg_id| sink.lock().unwrap().push(msg_id),
                t0,
            )
            .unwrap();

        let mut bytes = BytesMut::from(&frame_of(&delivered("a", 101))[..]);
        bytes.extend_from_slice(&[0xff; 11]);
        engine.handle_event(ChannelEvent::received(id, bytes.freeze()), t0);

        assert_eq!(*acked.lock().unwrap(), vec![101]);
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert_eq!(wire.closes(), vec![CloseCode::PROTOCOL_ERROR]);
        assert!(engine.reconnect().is_running());
    }

    #[test]
    fn handlers_see_bound_types_only() {
        let t0 = Instant::now();
        let (mut engine, _) = connected_engine(t0);
        let id = engine.channel_id().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        engine.subscribe(MessageType::HeartBeat, move |env: &Envelope| {
            sink.lock().unwrap().push(env.message_type())
        });
        let sink = Arc::clone(&seen);
        engine.subscribe_group_system(move |env: &Envelope| {
            sink.lock().unwrap().push(env.message_type())
        });

        let mut unknown = Envelope::hello();
        unknown.header.msg_type = 999;
        for env in [
            Envelope::heartbeat(),
            unknown,
            Envelope::status_sync(&Sender::new("x", "y"), 1),
            Envelope {
                header: Header::new(MessageType::SysGroupLeave),
                body: Some(Body::default()),
            },
        ] {
            engine.handle_event(ChannelEvent::received(id, frame_of(&env)), t0);
        }

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(MessageType::HeartBeat), Some(MessageType::SysGroupLeave)]
        );

        assert!(engine.unsubscribe(MessageType::HeartBeat));
        engine.handle_event(ChannelEvent::received(id, frame_of(&Envelope::heartbeat())), t0);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn disconnect_is_clean_and_keeps_resends() {
        let t0 = Instant::now();
        let (mut engine, wire) = connected_engine(t0);
        wire.refuse_send.store(true, Ordering::SeqCst);
        engine.send_message(chat(), |_| {}, |_| {}, t0).unwrap();

        engine.disconnect();
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert_eq!(wire.closes(), vec![CloseCode::NORMAL]);
        assert!(!engine.heartbeat().is_running());
        assert!(!engine.reconnect().is_running());
        assert_eq!(engine.send_agent().pending(), 1);
    }

    #[test]
    fn fire_and_forget_requires_connection() {
        let (mut engine, wire) = engine();
        assert!(matches!(
            engine.sync_status(1),
            Err(EngineError::ChannelUnavailable)
        ));
        assert!(matches!(
            engine.send_read_receipt(&Target::Group("g1".into()), "s", "42"),
            Err(EngineError::ChannelUnavailable)
        ));
        assert!(engine.request_status::<&str>(&[]).is_ok());
        assert!(wire.sent.lock().unwrap().is_empty());
        assert_eq!(engine.send_agent().pending(), 0);
    }

    #[test]
    fn fire_and_forget_writes_expected_types() {
        let t0 = Instant::now();
        let (mut engine, wire) = connected_engine(t0);
        engine.request_status(&["bob"]).unwrap();
        engine.request_status::<&str>(&[]).unwrap();
        engine.sync_status(2).unwrap();
        engine
            .send_read_receipt(&Target::Peer("bob".into()), "s", "42")
            .unwrap();
        assert_eq!(
            wire.sent_types(),
            vec![
                MessageType::Hello,
                MessageType::StatusReq,
                MessageType::StatusSync,
                MessageType::ChatRead
            ]
        );
    }

    #[test]
    fn auth_failure_schedules_reconnect() {
        let t0 = Instant::now();
        let wire = Wire::default();
        let mut engine = ConnectionEngine::new(
            EngineConfig::default(),
            "ws://h/ws",
            Sender::new("a", "b"),
            FailingAuth,
            MockConnector(wire.clone()),
        );
        engine.connect(t0);
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert_eq!(wire.opens(), 0);
        assert!(engine.reconnect().is_running());
    }

    #[test]
    fn refused_open_schedules_reconnect() {
        let t0 = Instant::now();
        let (mut engine, wire) = engine();
        wire.refuse_open.store(true, Ordering::SeqCst);
        engine.connect(t0);
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert!(engine.reconnect().is_running());

        wire.refuse_open.store(false, Ordering::SeqCst);
        engine.handle_timeout(t0 + engine.config().reconnect.interval);
        assert_eq!(engine.state(), ConnectionState::Connecting);
    }

    #[test]
    fn acks_evicted_after_grace() {
        let t0 = Instant::now();
        let (mut engine, _) = connected_engine(t0);
        let id = engine.channel_id().unwrap();
        let receipt = engine
            .send_message(chat().with_seq("a"), |_| {}, |_| {}, t0)
            .unwrap();
        engine.handle_event(ChannelEvent::received(id, frame_of(&delivered("a", 1))), t0);
        assert!(engine.pending_acks().contains(&receipt.seq));

        // keep the heartbeat fed so the channel stays up
        let grace = engine.config().ack_grace;
        let beat = engine.config().heartbeat.interval;
        let mut now = t0;
        while now < t0 + grace {
            now += beat;
            engine.handle_timeout(now);
            engine.handle_event(ChannelEvent::received(id, frame_of(&Envelope::heartbeat())), now);
        }
        assert!(!engine.pending_acks().contains(&receipt.seq));
    }
}
