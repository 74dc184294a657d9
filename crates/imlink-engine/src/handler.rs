use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use imlink_proto::{Envelope, MessageType};

/// Receives decoded envelopes of the types it is bound to.
pub trait Handler: Send + Sync {
    fn handle(&self, envelope: &Envelope);
}

impl<F> Handler for F
where
    F: Fn(&Envelope) + Send + Sync,
{
    fn handle(&self, envelope: &Envelope) {
        self(envelope)
    }
}

/// Message type to handler routing. Binding a type again replaces its handler.
#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<MessageType, Arc<dyn Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, msg_type: MessageType, handler: Arc<dyn Handler>) {
        self.handlers.insert(msg_type, handler);
    }

    /// Bind one handler to several types.
    pub fn bind_all(&mut self, types: &[MessageType], handler: Arc<dyn Handler>) {
        for msg_type in types {
            self.bind(*msg_type, Arc::clone(&handler));
        }
    }

    pub fn unbind(&mut self, msg_type: MessageType) -> bool {
        self.handlers.remove(&msg_type).is_some()
    }

    pub fn is_bound(&self, msg_type: MessageType) -> bool {
        self.handlers.contains_key(&msg_type)
    }

    /// Hand `envelope` to the handler bound for `msg_type`. Returns false if none is.
    pub fn dispatch(&self, msg_type: MessageType, envelope: &Envelope) -> bool {
        match self.handlers.get(&msg_type) {
            Some(handler) => {
                handler.handle(envelope);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bound: Vec<_> = self.handlers.keys().collect();
        bound.sort();
        f.debug_struct("HandlerTable").field("bound", &bound).finish()
    }
}
