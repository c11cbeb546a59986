//! Message construction from protocol envelopes.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{TimeZone, Utc};
use thiserror::Error;

use super::{Contact, ContactDirectory, Group, GroupDirectory};
use crate::error::BridgeError;
use crate::protocol::{AttachmentRecord, Envelope, GroupInfo};

/// Direction of a message relative to this account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Received from a counterpart.
    Incoming,
    /// Sent by this account (mirrored via a sync envelope).
    Sent,
}

/// Kind of message target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientKind {
    /// A single contact, addressed by number.
    Direct,
    /// A group, addressed by group identifier.
    Group,
}

impl FromStr for RecipientKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(RecipientKind::Direct),
            "group" => Ok(RecipientKind::Group),
            other => Err(BridgeError::InvalidRecipientKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for RecipientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RecipientKind::Direct => "direct",
            RecipientKind::Group => "group",
        })
    }
}

/// Message target: a kind plus the matching identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    /// Direct or group.
    pub kind: RecipientKind,
    /// Contact number, group identifier, or the account's own identity for
    /// direct incoming messages.
    pub id: String,
}

/// One attachment carried by a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// Storage identifier assigned by the subprocess.
    pub id: String,
    /// Original filename, when the sender provided one.
    pub filename: Option<String>,
    /// MIME content type.
    pub content_type: Option<String>,
    /// Resolved path under the attachment storage root; `None` until the
    /// subprocess has announced that root via its metadata response.
    pub path: Option<PathBuf>,
}

impl Attachment {
    fn from_record(record: AttachmentRecord, storage_root: Option<&Path>) -> Self {
        let path = storage_root.map(|root| root.join(&record.id));
        Self {
            id: record.id,
            filename: record.filename,
            content_type: record.content_type,
            path,
        }
    }
}

/// Recoverable envelope-to-message conversion failure.
///
/// These are expected for unsupported envelope shapes; the dispatcher
/// skips the envelope and keeps going. Kept separate from
/// [`BridgeError`] so a skip decision can never be confused with a fatal
/// condition.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// A sync payload named neither a destination nor a group.
    #[error("sync payload carries no recipient")]
    MissingRecipient,
}

/// One directional communication unit.
///
/// Constructed once per inbound envelope, immutable afterwards. Directory
/// entries for the sender and recipient are resolved at construction time;
/// a group resolution and a contact resolution are mutually exclusive.
#[derive(Debug, Clone)]
pub struct Message {
    /// Direction relative to this account.
    pub kind: MessageKind,
    /// Epoch milliseconds at which the message was sent.
    pub timestamp: i64,
    /// Sender identity.
    pub sender: String,
    /// Sender device index.
    pub sender_device: u32,
    /// Sender's directory entry (placeholder when unknown).
    pub sender_contact: Option<Contact>,
    /// Message target.
    pub recipient: Recipient,
    /// Recipient's directory entry, only for direct messages.
    pub recipient_contact: Option<Contact>,
    /// Recipient group, only for group messages and only when the group is
    /// known to the directory.
    pub group: Option<Group>,
    /// Message body.
    pub body: String,
    /// Attachments carried by the message.
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Construct a message from an inbound envelope.
    ///
    /// Returns `Ok(None)` for envelopes that carry no surfaceable message
    /// (receipts, typing indicators, sync payloads without a sent message)
    /// and `Err` for shapes that name a message but cannot be converted.
    /// Both cases are skip decisions for the dispatcher, never fatal.
    pub fn from_envelope(
        envelope: &Envelope,
        contacts: &ContactDirectory,
        groups: &GroupDirectory,
        own_identity: &str,
        attachments_root: Option<&Path>,
    ) -> Result<Option<Message>, EnvelopeError> {
        if let Some(data) = &envelope.data_message {
            if data.message.is_none() && data.attachments.is_empty() {
                return Ok(None);
            }
            let (recipient, recipient_contact, group) = Self::resolve_target(
                data.group_info.as_ref(),
                // Direct incoming messages target this account.
                Some(own_identity),
                contacts,
                groups,
            )?;
            return Ok(Some(Message {
                kind: MessageKind::Incoming,
                timestamp: envelope.timestamp,
                sender: envelope.source.clone(),
                sender_device: envelope.source_device,
                sender_contact: Some(lookup(contacts, &envelope.source)),
                recipient,
                recipient_contact,
                group,
                body: data.message.clone().unwrap_or_default(),
                attachments: data
                    .attachments
                    .iter()
                    .map(|r| Attachment::from_record(r.clone(), attachments_root))
                    .collect(),
            }));
        }

        if let Some(sync) = &envelope.sync_message {
            let Some(sent) = &sync.sent_message else {
                return Ok(None);
            };
            let (recipient, recipient_contact, group) = Self::resolve_target(
                sent.group_info.as_ref(),
                sent.destination.as_deref(),
                contacts,
                groups,
            )?;
            return Ok(Some(Message {
                kind: MessageKind::Sent,
                timestamp: envelope.timestamp,
                sender: envelope.source.clone(),
                sender_device: envelope.source_device,
                sender_contact: Some(lookup(contacts, &envelope.source)),
                recipient,
                recipient_contact,
                group,
                body: sent.message.clone().unwrap_or_default(),
                attachments: sent
                    .attachments
                    .iter()
                    .map(|r| Attachment::from_record(r.clone(), attachments_root))
                    .collect(),
            }));
        }

        Ok(None)
    }

    /// Resolve a message target from an optional group reference and an
    /// optional direct destination. Group wins when both are present.
    fn resolve_target(
        group_info: Option<&GroupInfo>,
        destination: Option<&str>,
        contacts: &ContactDirectory,
        groups: &GroupDirectory,
    ) -> Result<(Recipient, Option<Contact>, Option<Group>), EnvelopeError> {
        if let Some(info) = group_info {
            let recipient = Recipient {
                kind: RecipientKind::Group,
                id: info.group_id.clone(),
            };
            return Ok((recipient, None, groups.get(&info.group_id).cloned()));
        }
        let Some(destination) = destination else {
            return Err(EnvelopeError::MissingRecipient);
        };
        let recipient = Recipient {
            kind: RecipientKind::Direct,
            id: destination.to_string(),
        };
        let contact = lookup(contacts, destination);
        Ok((recipient, Some(contact), None))
    }

    /// Target for a reply to this message.
    ///
    /// Incoming direct messages are answered to the sender; incoming group
    /// messages to the same group. Self-sent messages are answered to
    /// their original recipient, and only when `include_sent` is set —
    /// otherwise `None` (not an error).
    pub fn reply_target(&self, include_sent: bool) -> Option<(RecipientKind, &str)> {
        match self.kind {
            MessageKind::Incoming => match self.recipient.kind {
                RecipientKind::Group => Some((RecipientKind::Group, &self.recipient.id)),
                RecipientKind::Direct => Some((RecipientKind::Direct, &self.sender)),
            },
            MessageKind::Sent => {
                include_sent.then_some((self.recipient.kind, self.recipient.id.as_str()))
            }
        }
    }

    /// Human-readable UTC rendering of the message timestamp.
    pub fn timestamp_display(&self) -> String {
        match Utc.timestamp_millis_opt(self.timestamp).single() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => self.timestamp.to_string(),
        }
    }
}

/// Directory lookup falling back to a placeholder.
fn lookup(contacts: &ContactDirectory, number: &str) -> Contact {
    contacts
        .get(number)
        .cloned()
        .unwrap_or_else(|| Contact::placeholder(number))
}
