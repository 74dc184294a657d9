use bytes::Bytes;
use prost::Message;

use crate::envelope::{Body, Envelope, Header, MAGIC, VERSION};
use crate::error::{CodecError, Result};
use crate::schema::{WireBody, WireHeader, WireMsg};

/// Serialize an envelope to its protobuf payload (no length prefix).
pub fn encode_envelope(envelope: &Envelope) -> Bytes {
    Bytes::from(to_wire(envelope).encode_to_vec())
}

/// Serialize an envelope and wrap it in a length-prefixed frame.
pub fn envelope_frame(envelope: &Envelope) -> Bytes {
    imlink_frame::encode(&encode_envelope(envelope))
}

/// Parse one frame payload.
///
/// Message types this client does not know still decode; see [`Header::message_type`].
pub fn decode_envelope(payload: &[u8]) -> Result<Envelope> {
    let wire = WireMsg::decode(payload)?;
    let header = wire.header.ok_or(CodecError::MissingHeader)?;

    if header.magic != MAGIC || header.version != VERSION {
        return Err(CodecError::ProtocolMismatch {
            magic: header.magic,
            version: header.version,
        });
    }

    Ok(Envelope {
        header: Header {
            magic: header.magic,
            version: header.version,
            msg_type: header.msg_type,
            is_extension: header.is_extension,
        },
        body: wire.body.map(from_wire_body),
    })
}

fn to_wire(envelope: &Envelope) -> WireMsg {
    let header = &envelope.header;
    WireMsg {
        header: Some(WireHeader {
            magic: header.magic,
            version: header.version,
            msg_type: header.msg_type,
            is_extension: header.is_extension,
        }),
        body: envelope.body.as_ref().map(|body| WireBody {
            from_id: body.from_id.clone(),
            from_client: body.from_client.clone(),
            to_id: body.to_id.clone(),
            group_id: body.group_id.clone(),
            msg_id: body.msg_id,
            session_id: body.session_id.clone(),
            content: body.content.clone(),
            content_type: body.content_type,
            seq: body.seq.clone(),
        }),
    }
}

fn from_wire_body(body: WireBody) -> Body {
    Body {
        from_id: body.from_id,
        from_client: body.from_client,
        to_id: body.to_id,
        group_id: body.group_id,
        session_id: body.session_id,
        content: body.content,
        content_type: body.content_type,
        seq: body.seq,
        msg_id: body.msg_id,
    }
}
