use imlink_proto::{
    envelope_frame, new_seq, Body, Envelope, Header, MessageType, OutboundMessage, Sender, Target,
};

use crate::cmd::{EncodeArgs, Encoding};
use crate::exit::{codec_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::print_raw;

pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let envelope = build_envelope(&args)?;
    tracing::debug!(msg_type = %args.msg_type, seq = ?envelope.seq(), "envelope built");

    let frame = envelope_frame(&envelope);
    match args.output {
        Encoding::Hex => println!("{}", hex::encode(&frame)),
        Encoding::Raw => print_raw(&frame),
    }
    Ok(SUCCESS)
}

fn build_envelope(args: &EncodeArgs) -> CliResult<Envelope> {
    let sender = Sender::new(args.from.clone(), args.client.clone());
    let envelope = match args.msg_type {
        MessageType::Hello => Envelope::hello(),
        MessageType::HeartBeat => Envelope::heartbeat(),
        MessageType::Chat | MessageType::GroupChat | MessageType::At => {
            let message = OutboundMessage {
                msg_type: args.msg_type,
                target: target(args)?,
                session_id: args.session.clone(),
                content: args.content.clone(),
                // AT carries no content type
                content_type: (args.msg_type != MessageType::At).then_some(args.content_type),
                seq: args.seq.clone(),
            };
            Envelope::outbound(&sender, &message)
                .map_err(|err| codec_error("encode failed", err))?
        }
        MessageType::ChatRead | MessageType::GroupChatRead => {
            let target = target(args)?;
            let expected = if matches!(target, Target::Peer(_)) {
                MessageType::ChatRead
            } else {
                MessageType::GroupChatRead
            };
            if expected != args.msg_type {
                return Err(CliError::new(
                    USAGE,
                    format!("{} cannot be addressed to a {}", args.msg_type, target.kind()),
                ));
            }
            let mut envelope = Envelope::read_receipt(
                &sender,
                &target,
                args.session.clone().unwrap_or_default(),
                args.content.clone(),
            );
            if let (Some(body), Some(seq)) = (envelope.body.as_mut(), &args.seq) {
                body.seq = Some(seq.clone());
            }
            envelope
        }
        MessageType::StatusReq => {
            let accounts: Vec<&str> = args
                .content
                .split(',')
                .map(str::trim)
                .filter(|account| !account.is_empty())
                .collect();
            Envelope::status_request(&sender, &accounts)
                .map_err(|err| codec_error("encode failed", err))?
        }
        MessageType::StatusSync => Envelope::status_sync(&sender, &args.content),
        other => Envelope {
            header: Header::new(other),
            body: Some(Body {
                from_id: args.from.clone(),
                from_client: args.client.clone(),
                to_id: args.to.clone(),
                group_id: args.group.clone(),
                session_id: args.session.clone(),
                content: args.content.clone(),
                content_type: Some(args.content_type),
                seq: Some(args.seq.clone().unwrap_or_else(new_seq)),
                ..Body::default()
            }),
        },
    };
    Ok(envelope)
}

fn target(args: &EncodeArgs) -> CliResult<Target> {
    match (&args.to, &args.group) {
        (Some(peer), None) => Ok(Target::Peer(peer.clone())),
        (None, Some(group)) => Ok(Target::Group(group.clone())),
        _ => Err(CliError::new(
            USAGE,
            format!("{} needs exactly one of --to or --group", args.msg_type),
        )),
    }
}
