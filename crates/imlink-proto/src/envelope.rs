use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{CodecError, Result};
use crate::message_type::MessageType;

/// Header sentinel identifying this protocol.
pub const MAGIC: u32 = 0x8e11_0b0b;

/// Protocol version this client speaks.
pub const VERSION: u32 = 1;

/// Generate a fresh client-side sequence token (UUID v4).
pub fn new_seq() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Fixed part of every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Header {
    pub magic: u32,
    pub version: u32,
    #[serde(rename = "type", serialize_with = "serialize_msg_type")]
    pub msg_type: i32,
    pub is_extension: bool,
}

impl Header {
    /// Header for `msg_type` carrying the current magic and version.
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            msg_type: msg_type.as_i32(),
            is_extension: false,
        }
    }

    /// The known message type, or `None` for a type this client does not understand.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_i32(self.msg_type)
    }
}

fn serialize_msg_type<S: Serializer>(value: &i32, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match MessageType::from_i32(*value) {
        Some(ty) => serializer.serialize_str(ty.as_str()),
        None => serializer.serialize_i32(*value),
    }
}

/// Payload of a data message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Body {
    pub from_id: String,
    pub from_client: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
}

impl Body {
    fn from_sender(sender: &Sender) -> Self {
        Self {
            from_id: sender.from_id.clone(),
            from_client: sender.from_client.clone(),
            ..Self::default()
        }
    }
}

/// One decoded protocol message.
///
/// Commands (HELLO, HEART_BEAT) have no body; everything else does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub header: Header,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,
}

impl Envelope {
    fn command(msg_type: MessageType) -> Self {
        Self {
            header: Header::new(msg_type),
            body: None,
        }
    }

    fn data(msg_type: MessageType, body: Body) -> Self {
        Self {
            header: Header::new(msg_type),
            body: Some(body),
        }
    }

    pub fn hello() -> Self {
        Self::command(MessageType::Hello)
    }

    pub fn heartbeat() -> Self {
        Self::command(MessageType::HeartBeat)
    }

    /// Build a CHAT, GROUP_CHAT or AT message.
    ///
    /// A fresh seq is generated when the message does not carry one.
    pub fn outbound(sender: &Sender, message: &OutboundMessage) -> Result<Self> {
        let mut body = Body::from_sender(sender);
        match (message.msg_type, &message.target) {
            (MessageType::Chat, Target::Peer(peer)) => body.to_id = Some(peer.clone()),
            (MessageType::GroupChat | MessageType::At, Target::Group(group)) => {
                body.group_id = Some(group.clone())
            }
            (msg_type, target) => {
                return Err(CodecError::InvalidTarget {
                    msg_type,
                    target: target.kind(),
                })
            }
        }
        body.session_id = message.session_id.clone();
        body.content = message.content.clone();
        body.content_type = message.content_type;
        body.seq = Some(message.seq.clone().unwrap_or_else(new_seq));
        Ok(Self::data(message.msg_type, body))
    }

    /// CHAT_READ for a peer or GROUP_CHAT_READ for a group.
    ///
    /// Both kinds address the conversation through `to_id`; the server routes on the type.
    pub fn read_receipt(
        sender: &Sender,
        target: &Target,
        session_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let msg_type = match target {
            Target::Peer(_) => MessageType::ChatRead,
            Target::Group(_) => MessageType::GroupChatRead,
        };
        let mut body = Body::from_sender(sender);
        body.to_id = Some(target.id().to_string());
        body.session_id = Some(session_id.into());
        body.content = content.into();
        body.seq = Some(new_seq());
        Self::data(msg_type, body)
    }

    /// STATUS_REQ asking for the presence of `accounts` (sent as a JSON array).
    pub fn status_request<S: AsRef<str>>(sender: &Sender, accounts: &[S]) -> Result<Self> {
        let accounts: Vec<&str> = accounts.iter().map(AsRef::as_ref).collect();
        let mut body = Body::from_sender(sender);
        body.content = serde_json::to_string(&accounts)?;
        Ok(Self::data(MessageType::StatusReq, body))
    }

    /// STATUS_SYNC publishing this client's own status.
    pub fn status_sync(sender: &Sender, status: impl fmt::Display) -> Self {
        let mut body = Body::from_sender(sender);
        body.content = status.to_string();
        Self::data(MessageType::StatusSync, body)
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.header.message_type()
    }

    pub fn is_command(&self) -> bool {
        self.body.is_none()
    }

    pub fn seq(&self) -> Option<&str> {
        self.body.as_ref()?.seq.as_deref()
    }

    pub fn msg_id(&self) -> Option<u64> {
        self.body.as_ref()?.msg_id
    }
}

/// Identity stamped on every data message this client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub from_id: String,
    pub from_client: String,
}

impl Sender {
    pub fn new(from_id: impl Into<String>, from_client: impl Into<String>) -> Self {
        Self {
            from_id: from_id.into(),
            from_client: from_client.into(),
        }
    }
}

/// Conversation a message is addressed to. `to_id` and `group_id` never coexist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Peer(String),
    Group(String),
}

impl Target {
    pub fn id(&self) -> &str {
        match self {
            Target::Peer(id) | Target::Group(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Target::Peer(_) => "peer",
            Target::Group(_) => "group",
        }
    }
}

/// A client-originated data message awaiting a seq and a sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub msg_type: MessageType,
    pub target: Target,
    pub session_id: Option<String>,
    pub content: String,
    pub content_type: Option<u32>,
    pub seq: Option<String>,
}

impl OutboundMessage {
    pub fn chat(
        peer: impl Into<String>,
        session_id: impl Into<String>,
        content: impl Into<String>,
        content_type: u32,
    ) -> Self {
        Self {
            msg_type: MessageType::Chat,
            target: Target::Peer(peer.into()),
            session_id: Some(session_id.into()),
            content: content.into(),
            content_type: Some(content_type),
            seq: None,
        }
    }

    pub fn group_chat(
        group: impl Into<String>,
        session_id: impl Into<String>,
        content: impl Into<String>,
        content_type: u32,
    ) -> Self {
        Self {
            msg_type: MessageType::GroupChat,
            target: Target::Group(group.into()),
            session_id: Some(session_id.into()),
            content: content.into(),
            content_type: Some(content_type),
            seq: None,
        }
    }

    /// Mention notification sent alongside a group message.
    pub fn at(
        group: impl Into<String>,
        session_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            msg_type: MessageType::At,
            target: Target::Group(group.into()),
            session_id: Some(session_id.into()),
            content: content.into(),
            content_type: None,
            seq: None,
        }
    }

    /// Use a caller-chosen seq instead of a generated one.
    pub fn with_seq(mut self, seq: impl Into<String>) -> Self {
        self.seq = Some(seq.into());
        self
    }
}
