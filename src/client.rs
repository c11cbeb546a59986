//! Bridge builder and runtime lifecycle.
//!
//! The [`BridgeBuilder`] provides a fluent API for configuring the bridge
//! and launching its subprocess. [`BridgeBuilder::start`]:
//! 1. Spawns the external binary with piped standard streams
//! 2. Wires the reader, dispatcher, and writer tasks through the two
//!    queues
//! 3. Optionally starts the liveness probe
//!
//! [`Bridge::run`] then drives the bridge until shutdown, which is
//! triggered by subprocess stdout closing, a fatal protocol error, or an
//! explicit [`BridgeHandle::shutdown`] call — and is idempotent in every
//! case.
//!
//! # Example
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
//!             println!("{}: {}", message.sender, message.body);
//!         }
//!         Ok(())
//!     }))?;
//!
//!     bridge.run().await?;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::dispatch::{self, Dispatcher, LivenessSlot, OutgoingHandle};
use crate::error::{BridgeError, Result};
use crate::events::{Callback, CallbackRegistry, CallbackToken, EventKind};
use crate::model::{Message, RecipientKind};
use crate::process::ChildProcess;
use crate::protocol::Request;
use crate::reader;

/// Default binary to launch when none is configured.
pub const DEFAULT_BIN_PATH: &str = "signal-cli";

/// Default liveness probe period.
pub const DEFAULT_LIVENESS_PERIOD: Duration = Duration::from_secs(2);

/// Default capacity of the incoming and outgoing queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Builder for configuring and starting a [`Bridge`].
pub struct BridgeBuilder {
    bin_path: String,
    account: Option<String>,
    liveness_check: bool,
    liveness_period: Duration,
    queue_capacity: usize,
}

impl BridgeBuilder {
    /// Create a builder with defaults.
    pub fn new() -> Self {
        Self {
            bin_path: DEFAULT_BIN_PATH.to_string(),
            account: None,
            liveness_check: false,
            liveness_period: DEFAULT_LIVENESS_PERIOD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Path to the external binary. Default: `signal-cli`.
    pub fn bin_path(mut self, path: &str) -> Self {
        self.bin_path = path.to_string();
        self
    }

    /// Account identity passed to the subprocess. Required.
    pub fn account(mut self, account: &str) -> Self {
        self.account = Some(account.to_string());
        self
    }

    /// Enable the periodic liveness probe. Default: off.
    pub fn liveness_check(mut self, enabled: bool) -> Self {
        self.liveness_check = enabled;
        self
    }

    /// Period between liveness probes. Default: 2 seconds.
    pub fn liveness_period(mut self, period: Duration) -> Self {
        self.liveness_period = period;
        self
    }

    /// Capacity of the incoming and outgoing queues. Default: 256.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Spawn the subprocess and start the bridge tasks.
    ///
    /// Must be called within a tokio runtime. Fails with
    /// [`BridgeError::Config`] when no account is configured and
    /// [`BridgeError::ProcessStart`] when the subprocess cannot launch.
    pub fn start(self) -> Result<Bridge> {
        let account = self
            .account
            .ok_or_else(|| BridgeError::Config("account is required".to_string()))?;

        let (child, streams) = ChildProcess::spawn(&self.bin_path, &account)?;

        let (incoming_tx, incoming_rx) = mpsc::channel(self.queue_capacity);
        let (diagnostic_tx, diagnostic_rx) = mpsc::channel(self.queue_capacity);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(self.queue_capacity);

        let registry = Arc::new(Mutex::new(CallbackRegistry::new()));
        let last_alive: LivenessSlot = Arc::new(Mutex::new(None));
        let outgoing = OutgoingHandle::new(outgoing_tx);

        let inner = Arc::new(Inner {
            child: tokio::sync::Mutex::new(child),
            shutdown_started: AtomicBool::new(false),
            liveness_task: Mutex::new(None),
        });
        let handle = BridgeHandle {
            outgoing: outgoing.clone(),
            inner: inner.clone(),
        };

        // Reader side. The stdout reader finishing is a shutdown trigger;
        // stderr closing on its own is not.
        let stdout_reader = tokio::spawn({
            let diagnostic_tx = diagnostic_tx.clone();
            let handle = handle.clone();
            async move {
                reader::read_stdout(BufReader::new(streams.stdout), incoming_tx, diagnostic_tx)
                    .await;
                handle.shutdown().await;
            }
        });
        let stderr_reader = tokio::spawn(reader::read_stderr(
            BufReader::new(streams.stderr),
            diagnostic_tx,
        ));

        // Dispatch and write sides.
        let dispatcher = Dispatcher::new(
            account,
            registry.clone(),
            outgoing.clone(),
            last_alive.clone(),
        );
        let dispatcher = tokio::spawn(dispatcher.run(incoming_rx, diagnostic_rx));
        let writer = tokio::spawn(dispatch::write_outgoing(outgoing_rx, streams.stdin));

        if self.liveness_check {
            let probe = outgoing.clone();
            let period = self.liveness_period;
            let task = tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await; // first tick fires immediately
                loop {
                    interval.tick().await;
                    let request = Request::alive(probe.next_req_id());
                    if probe.try_enqueue(request).is_err() {
                        // Queue full or closed; the probe never blocks.
                        tracing::debug!("liveness probe dropped");
                    }
                }
            });
            *inner.liveness_task.lock() = Some(task);
        }

        Ok(Bridge {
            handle,
            registry,
            last_alive,
            tasks: Tasks {
                stdout_reader,
                stderr_reader,
                dispatcher,
                writer,
            },
        })
    }
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state reachable from every [`BridgeHandle`] clone.
struct Inner {
    child: tokio::sync::Mutex<ChildProcess>,
    shutdown_started: AtomicBool,
    liveness_task: Mutex<Option<JoinHandle<()>>>,
}

struct Tasks {
    stdout_reader: JoinHandle<()>,
    stderr_reader: JoinHandle<()>,
    dispatcher: JoinHandle<Result<()>>,
    writer: JoinHandle<()>,
}

/// A running bridge instance.
///
/// Register callbacks and obtain a [`BridgeHandle`] before calling
/// [`Bridge::run`], which consumes the bridge and resolves once shutdown
/// has completed.
pub struct Bridge {
    handle: BridgeHandle,
    registry: Arc<Mutex<CallbackRegistry>>,
    last_alive: LivenessSlot,
    tasks: Tasks,
}

impl Bridge {
    /// Create a builder.
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// Cheaply cloneable handle for sends, replies, and shutdown —
    /// usable from inside callbacks.
    pub fn handle(&self) -> BridgeHandle {
        self.handle.clone()
    }

    /// Register a callback by event name (`"message"` or `"error"`).
    ///
    /// Fails with [`BridgeError::UnknownEvent`] for any other name.
    pub fn on(&self, event: &str, callback: Callback) -> Result<CallbackToken> {
        let kind: EventKind = event.parse()?;
        Ok(self.subscribe(kind, callback))
    }

    /// Register a callback for an event kind.
    pub fn subscribe(&self, kind: EventKind, callback: Callback) -> CallbackToken {
        self.registry.lock().subscribe(kind, callback)
    }

    /// Remove a previously registered callback. Silent no-op when the
    /// token is unknown.
    pub fn remove_callback(&self, token: CallbackToken) {
        self.registry.lock().unsubscribe(token);
    }

    /// Time of the last liveness acknowledgment from the subprocess.
    pub fn last_alive(&self) -> Option<SystemTime> {
        *self.last_alive.lock()
    }

    /// Send a message. See [`BridgeHandle::send_message`].
    pub async fn send_message(
        &self,
        recipient: &str,
        body: &str,
        kind: RecipientKind,
        attachments: Vec<String>,
    ) -> Result<()> {
        self.handle
            .send_message(recipient, body, kind, attachments)
            .await
    }

    /// Reply to a message. See [`BridgeHandle::reply`].
    pub async fn reply(
        &self,
        original: &Message,
        body: &str,
        attachments: Vec<String>,
        include_sent: bool,
    ) -> Result<()> {
        self.handle
            .reply(original, body, attachments, include_sent)
            .await
    }

    /// Initiate shutdown without waiting for [`Bridge::run`].
    pub async fn shutdown(&self) {
        self.handle.shutdown().await;
    }

    /// Drive the bridge until it has fully shut down.
    ///
    /// Resolves with `Err` only for fatal protocol conditions; normal
    /// shutdown (stdout end-of-stream or an explicit request) is `Ok`.
    pub async fn run(self) -> Result<()> {
        let Bridge { handle, tasks, .. } = self;

        let result = match tasks.dispatcher.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("dispatcher task failed: {}", e);
                Ok(())
            }
        };

        // Whatever ended the dispatcher, make sure the shutdown sequence
        // has run (it is idempotent).
        handle.shutdown().await;

        let _ = tasks.stdout_reader.await;
        let _ = tasks.stderr_reader.await;
        // The writer has no destination left; cloned handles may still
        // hold the queue open, so it is stopped rather than drained.
        tasks.writer.abort();
        let _ = tasks.writer.await;

        result
    }
}

/// Cheaply cloneable handle for sends, replies, and shutdown.
#[derive(Clone)]
pub struct BridgeHandle {
    outgoing: OutgoingHandle,
    inner: Arc<Inner>,
}

impl BridgeHandle {
    /// Enqueue a `send_message` request with a fresh request identifier.
    ///
    /// Suspends while the outgoing queue is full. Fails with
    /// [`BridgeError::QueueClosed`] once the bridge has shut down.
    pub async fn send_message(
        &self,
        recipient: &str,
        body: &str,
        kind: RecipientKind,
        attachments: Vec<String>,
    ) -> Result<()> {
        let req_id = self.outgoing.next_req_id();
        let request = match kind {
            RecipientKind::Direct => Request::send_to_number(req_id, recipient, body, attachments),
            RecipientKind::Group => Request::send_to_group(req_id, recipient, body, attachments),
        };
        self.outgoing.enqueue(request).await
    }

    /// Reply to a message, deriving the target from its direction.
    ///
    /// Incoming direct messages are answered to their sender, incoming
    /// group messages to the same group. Replies to self-sent messages
    /// are only honored when `include_sent` is set; otherwise this is a
    /// silent no-op.
    pub async fn reply(
        &self,
        original: &Message,
        body: &str,
        attachments: Vec<String>,
        include_sent: bool,
    ) -> Result<()> {
        let Some((kind, target)) = original.reply_target(include_sent) else {
            return Ok(());
        };
        let target = target.to_string();
        self.send_message(&target, body, kind, attachments).await
    }

    /// Run the shutdown sequence: cancel the liveness probe and terminate
    /// the subprocess. The stdout reader then observes end-of-stream,
    /// the incoming queue drains, and [`Bridge::run`] resolves.
    ///
    /// Idempotent; re-entrant calls return immediately.
    pub async fn shutdown(&self) {
        if self.inner.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("shutdown initiated");

        if let Some(task) = self.inner.liveness_task.lock().take() {
            task.abort();
        }
        self.inner.child.lock().await.terminate().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_account() {
        let result = BridgeBuilder::new().start();
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_builder_defaults() {
        let builder = BridgeBuilder::new();
        assert_eq!(builder.bin_path, DEFAULT_BIN_PATH);
        assert_eq!(builder.liveness_period, DEFAULT_LIVENESS_PERIOD);
        assert_eq!(builder.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(!builder.liveness_check);
        assert!(builder.account.is_none());
    }

    #[test]
    fn test_builder_configuration() {
        let builder = BridgeBuilder::new()
            .bin_path("/opt/bridge/bin")
            .account("+100")
            .liveness_check(true)
            .liveness_period(Duration::from_millis(500))
            .queue_capacity(32);
        assert_eq!(builder.bin_path, "/opt/bridge/bin");
        assert_eq!(builder.account.as_deref(), Some("+100"));
        assert!(builder.liveness_check);
        assert_eq!(builder.liveness_period, Duration::from_millis(500));
        assert_eq!(builder.queue_capacity, 32);
    }

    #[tokio::test]
    async fn test_on_rejects_unknown_event_name() {
        let bridge = Bridge::builder()
            .bin_path("cat")
            .account("+100")
            .start()
            .unwrap();
        let result = bridge.on("presence", Box::new(|_| Ok(())));
        assert!(matches!(result, Err(BridgeError::UnknownEvent(_))));
        bridge.shutdown().await;
        bridge.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_explicit_shutdown_is_idempotent() {
        let bridge = Bridge::builder()
            .bin_path("cat")
            .account("+100")
            .start()
            .unwrap();
        let handle = bridge.handle();
        handle.shutdown().await;
        handle.shutdown().await;
        bridge.run().await.unwrap();
        // Even after run() completed, another shutdown is a quiet no-op.
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails_with_queue_closed() {
        let bridge = Bridge::builder()
            .bin_path("cat")
            .account("+100")
            .start()
            .unwrap();
        let handle = bridge.handle();
        handle.shutdown().await;
        bridge.run().await.unwrap();

        let result = handle
            .send_message("+200", "hello", RecipientKind::Direct, vec![])
            .await;
        assert!(matches!(result, Err(BridgeError::QueueClosed)));
    }
}
