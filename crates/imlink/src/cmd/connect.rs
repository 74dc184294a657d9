use std::fs;
use std::path::Path;
use std::time::Duration;

use imlink_engine::{
    ConnectionEngine, ConnectionState, Driver, EngineConfig, EngineHandle, StaticAuth,
    WsConnector,
};
use imlink_proto::{content, Envelope, MessageType, OutboundMessage, Sender};
use tokio::sync::mpsc;

use crate::cmd::ConnectArgs;
use crate::exit::{engine_error, io_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS, TIMEOUT};
use crate::output::{print_envelope, OutputFormat};

pub fn run(args: ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;
    runtime.block_on(session(args, config, format))
}

fn load_config(path: &Path) -> CliResult<EngineConfig> {
    let text = fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    serde_json::from_str(&text).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("invalid config {}: {err}", path.display()),
        )
    })
}

async fn session(args: ConnectArgs, config: EngineConfig, format: OutputFormat) -> CliResult<i32> {
    let (connector, events) = WsConnector::new();
    let engine = ConnectionEngine::new(
        config,
        args.url.clone(),
        Sender::new(args.from.clone(), args.client.clone()),
        StaticAuth::new(args.token.clone(), args.secret.clone()),
        connector,
    );
    let handle = Driver::spawn(engine, events);

    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    for msg_type in MessageType::ALL {
        if matches!(msg_type, MessageType::Hello | MessageType::HeartBeat) {
            continue;
        }
        let seen_tx = seen_tx.clone();
        handle
            .subscribe(msg_type, move |envelope: &Envelope| {
                print_envelope(envelope, format);
                let _ = seen_tx.send(());
            })
            .map_err(|err| engine_error("subscribe failed", err))?;
    }
    drop(seen_tx);
    handle
        .on_delivery_failure(|failure| {
            tracing::error!(seq = %failure.seq, attempts = failure.attempts, "message not delivered");
        })
        .map_err(|err| engine_error("subscribe failed", err))?;

    handle
        .connect()
        .map_err(|err| engine_error("connect failed", err))?;
    let connected = tokio::time::timeout(
        Duration::from_secs(args.connect_timeout),
        handle.wait_for(ConnectionState::Connected),
    )
    .await;
    match connected {
        Ok(Ok(())) => tracing::info!(url = %args.url, "connected"),
        Ok(Err(err)) => return Err(engine_error("connect failed", err)),
        Err(_) => {
            handle.shutdown().await;
            return Err(CliError::new(
                TIMEOUT,
                format!("not connected to {} within {}s", args.url, args.connect_timeout),
            ));
        }
    }

    if let (Some(to), Some(message)) = (&args.to, &args.message) {
        send_one(&handle, to, &args.session, message).await?;
    }

    let mut printed = 0usize;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    tracing::warn!(error = %err, "ctrl-c handler unavailable");
                    handle.shutdown().await;
                    return Err(CliError::new(INTERNAL, format!("signal handling failed: {err}")));
                }
                tracing::info!("interrupted, disconnecting");
                break;
            }
            received = seen.recv() => {
                if received.is_none() {
                    break;
                }
                printed += 1;
                if args.count.is_some_and(|limit| printed >= limit) {
                    break;
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(SUCCESS)
}

async fn send_one(handle: &EngineHandle, to: &str, session: &str, message: &str) -> CliResult<()> {
    let receipt = handle
        .send_message(
            OutboundMessage::chat(to, session, message, content::TEXT),
            |msg_id| tracing::info!(msg_id, "message delivered"),
        )
        .await
        .map_err(|err| engine_error("send failed", err))?;
    tracing::info!(seq = %receipt.seq, outcome = ?receipt.outcome, to, "message sent");
    Ok(())
}
