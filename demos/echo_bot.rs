//! Echo bot — the canonical bridge consumer.
//!
//! Subscribes to incoming messages and answers each one with an echo of
//! its body, replying to the sender for direct messages and to the group
//! for group messages.
//!
//! # Running
//!
//! ```sh
//! cargo run --example echo_bot -- +4915551234567
//! ```
//!
//! The account must already be registered with the external binary.

use sigbridge::{BridgeBuilder, EventPayload};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let account = std::env::args()
        .nth(1)
        .ok_or("usage: echo_bot <account>")?;

    let bridge = BridgeBuilder::new()
        .account(&account)
        .liveness_check(true)
        .start()?;

    let handle = bridge.handle();
    bridge.on(
        "message",
        Box::new(move |payload| {
            if let EventPayload::Message(message) = payload {
                println!(
                    "[{}] {}: {}",
                    message.timestamp_display(),
                    message.sender,
                    message.body
                );

                // Callbacks are synchronous; the actual send runs as its
                // own task through a cloned handle.
                let handle = handle.clone();
                let message = message.clone();
                tokio::spawn(async move {
                    let text = format!("echo: {}", message.body);
                    if let Err(e) = handle.reply(&message, &text, vec![], false).await {
                        tracing::warn!("reply failed: {}", e);
                    }
                });
            }
            Ok(())
        }),
    )?;

    bridge.on(
        "error",
        Box::new(|payload| {
            if let EventPayload::Error(diagnostic) = payload {
                tracing::warn!(origin = ?diagnostic.origin, "{}", diagnostic.detail);
            }
            Ok(())
        }),
    )?;

    bridge.run().await?;
    Ok(())
}
