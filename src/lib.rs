//! # sigbridge
//!
//! Asynchronous bridge between application logic and a long-running
//! `signal-cli`-style subprocess speaking line-delimited JSON over its
//! standard streams.
//!
//! ## Architecture
//!
//! ```text
//! child stdout ─► stdout reader ─► incoming queue ─► dispatcher ─► callbacks
//! child stderr ─► stderr reader ─► diagnostics ──────────┘
//!
//! send / reply / liveness / refresh ─► outgoing queue ─► write loop ─► child stdin
//! ```
//!
//! One bridge instance owns exactly one subprocess. Stream I/O, dispatch,
//! and writing run as independent tasks that communicate only through the
//! two queues; contact and group directory state lives inside the
//! dispatcher task and is replaced wholesale from subprocess snapshots.
//!
//! ## Example
//!
//! ```ignore
//! use sigbridge::{BridgeBuilder, EventPayload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = BridgeBuilder::new()
//!         .account("+4915551234567")
//!         .liveness_check(true)
//!         .start()?;
//!
//!     let handle = bridge.handle();
//!     bridge.on("message", Box::new(move |payload| {
//!         if let EventPayload::Message(message) = payload {
//!             println!("[{}] {}: {}", message.timestamp_display(), message.sender, message.body);
//!         }
//!         Ok(())
//!     }))?;
//!
//!     bridge.run().await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod model;
pub mod process;
pub mod protocol;
pub mod reader;

mod client;

pub use client::{Bridge, BridgeBuilder, BridgeHandle};
pub use error::{BridgeError, Result};
pub use events::{
    Callback, CallbackToken, Diagnostic, DiagnosticOrigin, EventKind, EventPayload,
};
pub use model::{
    Attachment, Contact, Group, Message, MessageKind, Recipient, RecipientKind,
};
