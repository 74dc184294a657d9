use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use imlink_proto::MessageType;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod connect;
pub mod decode;
pub mod encode;
pub mod sign;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build an envelope and print it as a framed byte sequence.
    Encode(EncodeArgs),
    /// Read framed bytes and print the envelopes they carry.
    Decode(DecodeArgs),
    /// Print signed handshake parameters.
    Sign(SignArgs),
    /// Hold a live connection, print what arrives and optionally send one message.
    Connect(ConnectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Sign(args) => sign::run(args, format),
        Command::Connect(args) => connect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Byte representation on stdin/stdout.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Encoding {
    Hex,
    Raw,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Message type, e.g. chat, group_chat, heart_beat.
    #[arg(long = "type", short = 't', default_value = "chat")]
    pub msg_type: MessageType,
    /// Sender account id.
    #[arg(long, default_value = "")]
    pub from: String,
    /// Sender client tag.
    #[arg(long, default_value = "cli")]
    pub client: String,
    /// Peer account id.
    #[arg(long, conflicts_with = "group")]
    pub to: Option<String>,
    /// Group id.
    #[arg(long)]
    pub group: Option<String>,
    /// Conversation id.
    #[arg(long)]
    pub session: Option<String>,
    /// Message content. STATUS_REQ takes a comma-separated account list.
    #[arg(long, default_value = "")]
    pub content: String,
    /// Content-type bit flags.
    #[arg(long, default_value_t = imlink_proto::content::TEXT)]
    pub content_type: u32,
    /// Use this seq instead of a generated one.
    #[arg(long)]
    pub seq: Option<String>,
    /// Output encoding.
    #[arg(long, short = 'o', default_value = "hex")]
    pub output: Encoding,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File holding framed bytes. Reads stdin when omitted or "-".
    pub input: Option<PathBuf>,
    /// Input encoding.
    #[arg(long, short = 'i', default_value = "hex")]
    pub encoding: Encoding,
    /// Reject frames whose payload exceeds this many bytes.
    #[arg(long, default_value_t = imlink_frame::DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Access token.
    #[arg(long, env = "IMLINK_TOKEN", hide_env_values = true)]
    pub token: String,
    /// Session signing secret.
    #[arg(long, env = "IMLINK_SECRET", hide_env_values = true)]
    pub secret: String,
    /// Fixed trace id instead of a random one.
    #[arg(long)]
    pub trace_id: Option<String>,
    /// Fixed Unix timestamp (seconds) instead of now.
    #[arg(long)]
    pub timestamp: Option<u64>,
    /// Channel URL to append the parameters to.
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// WebSocket URL without the handshake query (ws://host:port/path).
    pub url: String,
    /// Own account id.
    #[arg(long, env = "IMLINK_ACCOUNT")]
    pub from: String,
    /// Own client tag.
    #[arg(long, default_value = "cli")]
    pub client: String,
    /// Access token.
    #[arg(long, env = "IMLINK_TOKEN", hide_env_values = true)]
    pub token: String,
    /// Session signing secret.
    #[arg(long, env = "IMLINK_SECRET", hide_env_values = true)]
    pub secret: String,
    /// Engine configuration file (JSON).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Send one chat message to this peer once connected.
    #[arg(long, requires = "message")]
    pub to: Option<String>,
    /// Content of the message sent with --to.
    #[arg(long, requires = "to")]
    pub message: Option<String>,
    /// Conversation id for the message sent with --to.
    #[arg(long, default_value = "cli")]
    pub session: String,
    /// Exit after printing N envelopes.
    #[arg(long)]
    pub count: Option<usize>,
    /// Give up if not connected within this many seconds.
    #[arg(long, default_value_t = 10)]
    pub connect_timeout: u64,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
