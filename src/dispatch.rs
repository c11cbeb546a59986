//! Incoming dispatch and outgoing write loops.
//!
//! # Architecture
//!
//! ```text
//! stdout reader ──► incoming queue ──► Dispatcher ──► directories
//! stderr reader ──► diagnostics  ──►      │      ──► callbacks
//!
//! send/reply ─┐
//! liveness  ──┼─► OutgoingHandle ─► outgoing queue ─► write loop ─► child stdin
//! refresh   ──┘
//! ```
//!
//! The dispatcher is the only place directory state is mutated. It drains
//! the incoming queue strictly in arrival order on a single task, so a
//! directory snapshot is always fully applied before any later envelope is
//! turned into a message — no locking needed for that guarantee.
//!
//! The outgoing side funnels every writer (application sends, the liveness
//! probe, directory refreshes) through one queue and one write loop, which
//! awaits each flush before taking the next request. Outbound wire order
//! therefore equals enqueue order.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use crate::codec::LineCodec;
use crate::error::{BridgeError, Result};
use crate::events::{
    CallbackRegistry, Diagnostic, DiagnosticOrigin, EventPayload,
};
use crate::model::{Contact, ContactDirectory, Group, GroupDirectory, Message};
use crate::process::write_line;
use crate::protocol::{
    ContactRecord, GroupRecord, MetadataBody, Request, Response, ResponseType, API_VERSION,
};

/// Shared slot holding the time of the last liveness acknowledgment.
pub type LivenessSlot = Arc<Mutex<Option<SystemTime>>>;

/// Handle for enqueueing outbound requests.
///
/// Cheaply cloneable; assigns `reqID`s from a shared monotonically
/// increasing counter at enqueue time.
#[derive(Clone)]
pub struct OutgoingHandle {
    tx: mpsc::Sender<Request>,
    next_req_id: Arc<AtomicU64>,
}

impl OutgoingHandle {
    /// Create a handle feeding the given queue.
    pub fn new(tx: mpsc::Sender<Request>) -> Self {
        Self {
            tx,
            next_req_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Claim the next request identifier. Never reused.
    pub fn next_req_id(&self) -> u64 {
        self.next_req_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Enqueue a request, suspending while the queue is full.
    pub async fn enqueue(&self, request: Request) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| BridgeError::QueueClosed)
    }

    /// Enqueue without waiting; drops the request when the queue is full.
    ///
    /// Used by the liveness probe, which must never block on the queue.
    pub fn try_enqueue(&self, request: Request) -> Result<()> {
        self.tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::debug!("outgoing queue full, dropping request");
                BridgeError::QueueClosed
            }
            mpsc::error::TrySendError::Closed(_) => BridgeError::QueueClosed,
        })
    }
}

/// Incoming dispatcher: owns directory state, classifies responses,
/// constructs messages, and fires callbacks.
pub struct Dispatcher {
    contacts: ContactDirectory,
    groups: GroupDirectory,
    attachments_dir: Option<PathBuf>,
    own_identity: String,
    registry: Arc<Mutex<CallbackRegistry>>,
    outgoing: OutgoingHandle,
    last_alive: LivenessSlot,
}

impl Dispatcher {
    /// Create a dispatcher with empty directories.
    pub fn new(
        own_identity: String,
        registry: Arc<Mutex<CallbackRegistry>>,
        outgoing: OutgoingHandle,
        last_alive: LivenessSlot,
    ) -> Self {
        Self {
            contacts: ContactDirectory::new(),
            groups: GroupDirectory::new(),
            attachments_dir: None,
            own_identity,
            registry,
            outgoing,
            last_alive,
        }
    }

    /// Drain the incoming queue until it closes, interleaving diagnostics
    /// from the readers.
    ///
    /// Returns `Err` only for fatal protocol conditions; the caller then
    /// runs the shutdown sequence. Queue closure (stdout reader finished)
    /// is the normal exit.
    pub async fn run(
        mut self,
        mut incoming_rx: mpsc::Receiver<Response>,
        mut diagnostic_rx: mpsc::Receiver<Diagnostic>,
    ) -> Result<()> {
        let mut diagnostics_open = true;
        loop {
            tokio::select! {
                biased;
                response = incoming_rx.recv() => match response {
                    Some(response) => self.handle(response).await?,
                    None => break,
                },
                diagnostic = diagnostic_rx.recv(), if diagnostics_open => match diagnostic {
                    Some(diagnostic) => self.fire_error(diagnostic),
                    None => diagnostics_open = false,
                },
            }
        }

        // Flush diagnostics that raced the queue closing.
        while let Ok(diagnostic) = diagnostic_rx.try_recv() {
            self.fire_error(diagnostic);
        }
        Ok(())
    }

    /// Handle one response. `Err` means a fatal protocol condition.
    async fn handle(&mut self, response: Response) -> Result<()> {
        if let Some(version) = response.api_ver {
            if version != API_VERSION {
                tracing::error!(found = version, "unsupported protocol version");
                return Err(BridgeError::ProtocolVersion { found: version });
            }
        }

        match response.resp_type {
            ResponseType::Alive => {
                *self.last_alive.lock() = Some(SystemTime::now());
            }
            ResponseType::Metadata => self.handle_metadata(response).await,
            ResponseType::Envelope => self.handle_envelope(response),
            ResponseType::ListContacts => self.replace_contacts(response.data),
            ResponseType::ListGroups => self.replace_groups(response.data),
            // Fire-and-forget: send acknowledgments are not correlated
            // back to outstanding requests.
            ResponseType::SendMessage => {}
            ResponseType::Unknown => {
                tracing::warn!("unrecognized response type");
                self.fire_error(Diagnostic {
                    origin: DiagnosticOrigin::Protocol,
                    detail: "unrecognized response type".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Capture the attachment storage root and kick off a directory
    /// refresh.
    async fn handle_metadata(&mut self, response: Response) {
        if let Some(data) = response.data {
            match serde_json::from_value::<MetadataBody>(data) {
                Ok(body) => {
                    self.attachments_dir = body.attachments_dir.map(PathBuf::from);
                }
                Err(e) => tracing::warn!("malformed metadata payload: {}", e),
            }
        }

        let contacts = Request::list_contacts(self.outgoing.next_req_id());
        let groups = Request::list_groups(self.outgoing.next_req_id());
        for request in [contacts, groups] {
            if self.outgoing.enqueue(request).await.is_err() {
                tracing::debug!("outgoing queue closed, directory refresh dropped");
                return;
            }
        }
    }

    /// Construct a message from an envelope and fire the `message` event.
    ///
    /// Unsupported or malformed envelope shapes are expected; they are
    /// skipped without firing anything.
    fn handle_envelope(&mut self, response: Response) {
        let Some(envelope) = response.envelope else {
            tracing::warn!("envelope response without envelope payload");
            return;
        };

        match Message::from_envelope(
            &envelope,
            &self.contacts,
            &self.groups,
            &self.own_identity,
            self.attachments_dir.as_deref(),
        ) {
            Ok(Some(message)) => {
                self.registry
                    .lock()
                    .dispatch(&EventPayload::Message(message));
            }
            Ok(None) => tracing::trace!("envelope carries no message payload"),
            Err(e) => tracing::debug!("envelope skipped: {}", e),
        }
    }

    /// Replace the contact directory wholesale.
    fn replace_contacts(&mut self, data: Option<serde_json::Value>) {
        let Some(data) = data else {
            tracing::warn!("list_contacts response without data");
            return;
        };
        match serde_json::from_value::<Vec<ContactRecord>>(data) {
            Ok(records) => {
                self.contacts = records
                    .into_iter()
                    .map(Contact::from_record)
                    .map(|c| (c.number.clone(), c))
                    .collect();
                tracing::debug!(count = self.contacts.len(), "contact directory replaced");
            }
            Err(e) => tracing::warn!("malformed contact snapshot: {}", e),
        }
    }

    /// Replace the group directory wholesale.
    fn replace_groups(&mut self, data: Option<serde_json::Value>) {
        let Some(data) = data else {
            tracing::warn!("list_groups response without data");
            return;
        };
        match serde_json::from_value::<Vec<GroupRecord>>(data) {
            Ok(records) => {
                self.groups = records
                    .into_iter()
                    .map(Group::from_record)
                    .map(|g| (g.id.clone(), g))
                    .collect();
                tracing::debug!(count = self.groups.len(), "group directory replaced");
            }
            Err(e) => tracing::warn!("malformed group snapshot: {}", e),
        }
    }

    fn fire_error(&mut self, diagnostic: Diagnostic) {
        self.registry
            .lock()
            .dispatch(&EventPayload::Error(diagnostic));
    }
}

/// Outgoing write loop: encode queued requests and write them through the
/// subprocess stdin, one at a time, awaiting each flush.
///
/// Exits cleanly when the queue closes; a write failure ends the loop
/// (the subprocess input is gone, shutdown follows via stdout EOF).
pub async fn write_outgoing<W>(mut rx: mpsc::Receiver<Request>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(request) = rx.recv().await {
        let line = match LineCodec::encode(&request) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("failed to encode request: {}", e);
                continue;
            }
        };
        if let Err(e) = write_line(&mut writer, &line).await {
            tracing::warn!("outbound write failed: {}", e);
            return;
        }
    }
    tracing::debug!("outgoing queue closed");
}
