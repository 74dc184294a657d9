//! Connect, send one chat message and print its server-assigned id.
//!
//! ```text
//! cargo run -p imlink --features async --example chat-client -- ws://localhost:8080/ws alice bob
//! ```

use imlink::engine::{
    ConnectionEngine, ConnectionState, Driver, EngineConfig, StaticAuth, WsConnector,
};
use imlink::proto::{content, Envelope, MessageType, OutboundMessage, Sender};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let url = args.next().unwrap_or_else(|| "ws://127.0.0.1:8080/ws".into());
    let from = args.next().unwrap_or_else(|| "alice".into());
    let to = args.next().unwrap_or_else(|| "bob".into());

    let token = std::env::var("IMLINK_TOKEN").unwrap_or_default();
    let secret = std::env::var("IMLINK_SECRET").unwrap_or_default();

    let (connector, events) = WsConnector::new();
    let engine = ConnectionEngine::new(
        EngineConfig::default(),
        url,
        Sender::new(from, "example"),
        StaticAuth::new(token, secret),
        connector,
    );
    let handle = Driver::spawn(engine, events);

    handle.subscribe(MessageType::Chat, |envelope: &Envelope| {
        if let Some(body) = &envelope.body {
            println!("{}: {}", body.from_id, body.content);
        }
    })?;

    handle.connect()?;
    handle.wait_for(ConnectionState::Connected).await?;

    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut tx = Some(tx);
    handle
        .send_message(
            OutboundMessage::chat(to, "example", "hello from imlink", content::TEXT),
            move |msg_id| {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(msg_id);
                }
            },
        )
        .await?;
    println!("delivered as msg {}", rx.await?);

    handle.shutdown().await;
    Ok(())
}
