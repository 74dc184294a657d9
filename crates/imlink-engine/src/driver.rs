//! Runs a [`ConnectionEngine`] on a tokio task.
//!
//! Commands from [`EngineHandle`]s and events from the connector share one task, so the
//! engine is only ever touched from a single place. Timer deadlines are awaited with
//! `sleep_until(engine.poll_timeout())`.

use std::fmt;
use std::sync::Arc;

use imlink_proto::{Envelope, MessageType, OutboundMessage, Target};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant as TokioInstant;

use crate::config::MAX_TIMER;
use crate::connector::{ChannelEvent, Connector};
use crate::engine::{ConnectionEngine, ConnectionState, SendReceipt};
use crate::error::{EngineError, Result};
use crate::handler::Handler;
use crate::handshake::AuthProvider;
use crate::send_agent::DeliveryFailure;

type BeforeHook = Box<dyn FnOnce(&Envelope) + Send>;
type AfterHook = Box<dyn FnMut(u64) + Send>;
type FailureHook = Arc<dyn Fn(&DeliveryFailure) + Send + Sync>;

enum Command {
    Connect,
    Disconnect,
    Send {
        message: OutboundMessage,
        before: Option<BeforeHook>,
        after: AfterHook,
        reply: oneshot::Sender<Result<SendReceipt>>,
    },
    ReadReceipt {
        target: Target,
        session_id: String,
        content: String,
        reply: oneshot::Sender<Result<()>>,
    },
    RequestStatus {
        accounts: Vec<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    SyncStatus {
        status: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        types: Vec<MessageType>,
        handler: Arc<dyn Handler>,
    },
    Unsubscribe(MessageType),
    OnDeliveryFailure(FailureHook),
    Shutdown,
}

/// Owns the engine inside the driver task.
pub struct Driver<K: Connector, A: AuthProvider> {
    engine: ConnectionEngine<K, A>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    state: watch::Sender<ConnectionState>,
}

impl<K, A> Driver<K, A>
where
    K: Connector + Send + 'static,
    K::Channel: Send,
    A: AuthProvider + Send + 'static,
{
    /// Spawn the driver task. `events` is the receiving end of the connector's event queue.
    pub fn spawn(
        engine: ConnectionEngine<K, A>,
        events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> EngineHandle {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(engine.state());
        let driver = Driver {
            engine,
            commands,
            events,
            state,
        };
        tokio::spawn(driver.run());
        EngineHandle {
            commands: command_tx,
            state: state_rx,
        }
    }

    async fn run(mut self) {
        tracing::debug!("engine driver started");
        loop {
            let deadline = self.engine.poll_timeout();
            let sleep_until = deadline
                .map(TokioInstant::from_std)
                .unwrap_or_else(|| TokioInstant::now() + MAX_TIMER);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
                Some(event) = self.events.recv() => {
                    self.engine.handle_event(event, now());
                }
                _ = tokio::time::sleep_until(sleep_until), if deadline.is_some() => {
                    self.engine.handle_timeout(now());
                }
            }

            self.publish_state();
        }

        self.engine.disconnect();
        self.publish_state();
        tracing::debug!("engine driver stopped");
    }

    fn apply(&mut self, command: Command) {
        let at = now();
        match command {
            Command::Connect => self.engine.connect(at),
            Command::Disconnect => self.engine.disconnect(),
            Command::Send {
                message,
                before,
                after,
                reply,
            } => {
                let result = self.engine.send_message(
                    message,
                    |envelope| {
                        if let Some(before) = before {
                            before(envelope);
                        }
                    },
                    after,
                    at,
                );
                let _ = reply.send(result);
            }
            Command::ReadReceipt {
                target,
                session_id,
                content,
                reply,
            } => {
                let _ = reply.send(self.engine.send_read_receipt(&target, session_id, content));
            }
            Command::RequestStatus { accounts, reply } => {
                let _ = reply.send(self.engine.request_status(&accounts));
            }
            Command::SyncStatus { status, reply } => {
                let _ = reply.send(self.engine.sync_status(status));
            }
            Command::Subscribe { types, handler } => {
                self.engine.handlers_mut().bind_all(&types, handler);
            }
            Command::Unsubscribe(msg_type) => {
                self.engine.unsubscribe(msg_type);
            }
            Command::OnDeliveryFailure(hook) => {
                self.engine.on_delivery_failure(move |failure| hook(failure));
            }
            Command::Shutdown => {}
        }
    }

    fn publish_state(&self) {
        let current = self.engine.state();
        self.state.send_if_modified(|state| {
            if *state == current {
                return false;
            }
            *state = current;
            true
        });
    }
}

fn now() -> std::time::Instant {
    TokioInstant::now().into_std()
}

/// Cloneable handle to a running driver.
///
/// Every method fails with [`EngineError::DriverClosed`] once the driver has stopped.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl EngineHandle {
    pub fn connect(&self) -> Result<()> {
        self.command(Command::Connect)
    }

    pub fn disconnect(&self) -> Result<()> {
        self.command(Command::Disconnect)
    }

    /// Send with at-least-once delivery; `after` receives the server `msgId`.
    pub async fn send_message<F>(&self, message: OutboundMessage, after: F) -> Result<SendReceipt>
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.send_inner(message, None, Box::new(after)).await
    }

    /// Like [`send_message`](Self::send_message), also calling `before` with the built
    /// envelope before it is handed to the channel.
    pub async fn send_message_with<B, F>(
        &self,
        message: OutboundMessage,
        before: B,
        after: F,
    ) -> Result<SendReceipt>
    where
        B: FnOnce(&Envelope) + Send + 'static,
        F: FnMut(u64) + Send + 'static,
    {
        self.send_inner(message, Some(Box::new(before)), Box::new(after))
            .await
    }

    async fn send_inner(
        &self,
        message: OutboundMessage,
        before: Option<BeforeHook>,
        after: AfterHook,
    ) -> Result<SendReceipt> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            message,
            before,
            after,
            reply,
        })?;
        rx.await.map_err(|_| EngineError::DriverClosed)?
    }

    pub async fn send_read_receipt(
        &self,
        target: Target,
        session_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::ReadReceipt {
            target,
            session_id: session_id.into(),
            content: content.into(),
            reply,
        })?;
        rx.await.map_err(|_| EngineError::DriverClosed)?
    }

    pub async fn request_status(&self, accounts: Vec<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::RequestStatus { accounts, reply })?;
        rx.await.map_err(|_| EngineError::DriverClosed)?
    }

    pub async fn sync_status(&self, status: impl fmt::Display) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::SyncStatus {
            status: status.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| EngineError::DriverClosed)?
    }

    pub fn subscribe<H: Handler + 'static>(&self, msg_type: MessageType, handler: H) -> Result<()> {
        self.command(Command::Subscribe {
            types: vec![msg_type],
            handler: Arc::new(handler),
        })
    }

    pub fn subscribe_group_system<H: Handler + 'static>(&self, handler: H) -> Result<()> {
        self.command(Command::Subscribe {
            types: MessageType::GROUP_SYSTEM.to_vec(),
            handler: Arc::new(handler),
        })
    }

    pub fn unsubscribe(&self, msg_type: MessageType) -> Result<()> {
        self.command(Command::Unsubscribe(msg_type))
    }

    pub fn on_delivery_failure<F>(&self, hook: F) -> Result<()>
    where
        F: Fn(&DeliveryFailure) + Send + Sync + 'static,
    {
        self.command(Command::OnDeliveryFailure(Arc::new(hook)))
    }

    /// Latest published connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the engine reaches `target`.
    pub async fn wait_for(&self, target: ConnectionState) -> Result<()> {
        let mut rx = self.state.clone();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| EngineError::DriverClosed)
    }

    /// Disconnect cleanly and stop the driver task, waiting for it to finish.
    pub async fn shutdown(&self) {
        if self.command(Command::Shutdown).is_err() {
            return;
        }
        let mut rx = self.state.clone();
        while rx.changed().await.is_ok() {}
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| EngineError::DriverClosed)
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("state", &self.state())
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}
