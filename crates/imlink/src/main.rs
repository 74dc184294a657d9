mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "imlink", version, about = "Messaging connection engine CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "IMLINK_LOG",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_encode_subcommand() {
        let cli = Cli::try_parse_from([
            "imlink", "encode", "--type", "group-chat", "--group", "g1", "--content", "hi",
        ])
        .expect("encode args should parse");

        let Command::Encode(args) = cli.command else {
            panic!("expected encode");
        };
        assert_eq!(args.msg_type, imlink_proto::MessageType::GroupChat);
        assert_eq!(args.group.as_deref(), Some("g1"));
    }

    #[test]
    fn rejects_peer_and_group_together() {
        let err = Cli::try_parse_from(["imlink", "encode", "--to", "bob", "--group", "g1"])
            .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_unknown_message_type() {
        let err = Cli::try_parse_from(["imlink", "encode", "--type", "telegram"])
            .expect_err("unknown type should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn connect_message_requires_recipient() {
        let err = Cli::try_parse_from([
            "imlink", "connect", "ws://localhost/ws", "--from", "alice", "--token", "t",
            "--secret", "s", "--message", "hi",
        ])
        .expect_err("--message without --to should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_sign_with_fixed_inputs() {
        let cli = Cli::try_parse_from([
            "imlink", "--format", "json", "sign", "--token", "t", "--secret", "s",
            "--timestamp", "1700000000",
        ])
        .expect("sign args should parse");
        assert!(matches!(cli.command, Command::Sign(_)));
        assert_eq!(cli.format, Some(OutputFormat::Json));
    }
}
