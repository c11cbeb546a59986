//! Wire protocol types for the subprocess JSON event loop.
//!
//! One JSON object per line, UTF-8, `\n` terminated, in both directions.
//! Outbound lines are [`Request`]s written to the child's stdin; inbound
//! lines are [`Response`]s read from its stdout. The discriminator fields
//! are `reqType` and `respType`; inbound objects additionally carry
//! `apiVer`, of which only version 2 is supported.
//!
//! These types describe the wire shape only. Directory and message
//! construction from inbound payloads lives in [`crate::model`].

use serde::{Deserialize, Serialize};

/// The only supported protocol version.
pub const API_VERSION: i64 = 2;

/// Request type discriminator (`reqType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Liveness probe.
    Alive,
    /// Ask for a full contact directory snapshot.
    ListContacts,
    /// Ask for a full group directory snapshot.
    ListGroups,
    /// Send a message to a contact or group.
    SendMessage,
}

/// Outbound request, serialized to a single JSON line.
///
/// `req_id` values are assigned by the bridge from a monotonically
/// increasing counter and are never reused within a process lifetime.
/// Responses are not correlated back to requests (fire-and-forget).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Request {
    /// Unique, monotonically increasing request identifier.
    #[serde(rename = "reqID")]
    pub req_id: u64,
    /// Request type discriminator.
    #[serde(rename = "reqType")]
    pub req_type: RequestType,
    /// Message payload, present only for `send_message`.
    #[serde(rename = "dataMessage", skip_serializing_if = "Option::is_none")]
    pub data_message: Option<OutboundDataMessage>,
    /// Direct recipient, present only for `send_message` to a contact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<RecipientRef>,
}

impl Request {
    /// Build a liveness probe.
    pub fn alive(req_id: u64) -> Self {
        Self {
            req_id,
            req_type: RequestType::Alive,
            data_message: None,
            recipient: None,
        }
    }

    /// Build a contact directory refresh request.
    pub fn list_contacts(req_id: u64) -> Self {
        Self {
            req_id,
            req_type: RequestType::ListContacts,
            data_message: None,
            recipient: None,
        }
    }

    /// Build a group directory refresh request.
    pub fn list_groups(req_id: u64) -> Self {
        Self {
            req_id,
            req_type: RequestType::ListGroups,
            data_message: None,
            recipient: None,
        }
    }

    /// Build a `send_message` request to a direct recipient.
    pub fn send_to_number(
        req_id: u64,
        number: &str,
        body: &str,
        attachments: Vec<String>,
    ) -> Self {
        Self {
            req_id,
            req_type: RequestType::SendMessage,
            data_message: Some(OutboundDataMessage {
                message: body.to_string(),
                attachments,
                group_info: None,
            }),
            recipient: Some(RecipientRef {
                number: number.to_string(),
            }),
        }
    }

    /// Build a `send_message` request to a group.
    pub fn send_to_group(
        req_id: u64,
        group_id: &str,
        body: &str,
        attachments: Vec<String>,
    ) -> Self {
        Self {
            req_id,
            req_type: RequestType::SendMessage,
            data_message: Some(OutboundDataMessage {
                message: body.to_string(),
                attachments,
                group_info: Some(GroupInfo {
                    group_id: group_id.to_string(),
                }),
            }),
            recipient: None,
        }
    }
}

/// Message payload of an outbound `send_message` request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutboundDataMessage {
    /// Message body text.
    pub message: String,
    /// Attachment file paths to hand to the subprocess.
    pub attachments: Vec<String>,
    /// Target group, mutually exclusive with `Request::recipient`.
    #[serde(rename = "groupInfo", skip_serializing_if = "Option::is_none")]
    pub group_info: Option<GroupInfo>,
}

/// Direct recipient reference (`recipient.number`).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecipientRef {
    /// Phone-number-like identity of the recipient.
    pub number: String,
}

/// Response type discriminator (`respType`).
///
/// Unrecognized values map to [`ResponseType::Unknown`] rather than failing
/// the whole line; the dispatcher reports them as non-fatal warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Liveness acknowledgment.
    Alive,
    /// Startup metadata: protocol version, attachment storage root.
    Metadata,
    /// A received or synced message event.
    Envelope,
    /// Full group directory snapshot.
    ListGroups,
    /// Full contact directory snapshot.
    ListContacts,
    /// Acknowledgment of an outbound `send_message`.
    SendMessage,
    /// Anything this bridge does not recognize.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResponseType::Alive => "alive",
            ResponseType::Metadata => "metadata",
            ResponseType::Envelope => "envelope",
            ResponseType::ListGroups => "list_groups",
            ResponseType::ListContacts => "list_contacts",
            ResponseType::SendMessage => "send_message",
            ResponseType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Inbound response, decoded from a single JSON line.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Protocol version reported by the subprocess.
    #[serde(rename = "apiVer")]
    pub api_ver: Option<i64>,
    /// Response type discriminator.
    #[serde(rename = "respType")]
    pub resp_type: ResponseType,
    /// Type-specific payload: directory records for `list_contacts` /
    /// `list_groups`, metadata fields for `metadata`.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Message payload, present only for `envelope`.
    #[serde(default)]
    pub envelope: Option<Envelope>,
}

/// Metadata payload carried in the `data` field of a `metadata` response.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataBody {
    /// Root directory where the subprocess stores received attachments.
    #[serde(rename = "attachmentsDir")]
    pub attachments_dir: Option<String>,
}

/// One contact record in a `list_contacts` snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactRecord {
    /// Stable phone-number-like identity.
    pub number: String,
    /// Display name; may be empty for unnamed contacts.
    #[serde(default)]
    pub name: String,
    /// Color tag assigned by the subprocess.
    #[serde(default)]
    pub color: String,
    /// Opaque profile key, absent when the contact has none.
    #[serde(rename = "profileKey", default)]
    pub profile_key: Option<String>,
    /// Whether the account has blocked this contact.
    #[serde(default)]
    pub blocked: bool,
}

/// One group record in a `list_groups` snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupRecord {
    /// Stable group identifier.
    #[serde(rename = "groupId")]
    pub group_id: String,
    /// Group display name.
    #[serde(default)]
    pub name: String,
    /// Color tag assigned by the subprocess.
    #[serde(default)]
    pub color: String,
    /// Whether the account has blocked this group.
    #[serde(default)]
    pub blocked: bool,
    /// Whether the account is an active member.
    #[serde(default)]
    pub active: bool,
    /// Member identities, in subprocess order.
    #[serde(default)]
    pub members: Vec<String>,
}

/// Inbound message event payload (`envelope`).
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// Epoch milliseconds at which the message was sent.
    pub timestamp: i64,
    /// Sender identity.
    pub source: String,
    /// Sender device index.
    #[serde(rename = "sourceDevice", default)]
    pub source_device: u32,
    /// Present when this envelope carries a received message.
    #[serde(rename = "dataMessage", default)]
    pub data_message: Option<DataMessage>,
    /// Present when this envelope mirrors a message sent from another
    /// device of the same account.
    #[serde(rename = "syncMessage", default)]
    pub sync_message: Option<SyncMessage>,
}

/// Received message payload inside an envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct DataMessage {
    /// Message body; absent for e.g. reaction-only messages.
    #[serde(default)]
    pub message: Option<String>,
    /// Attachment descriptors.
    #[serde(default)]
    pub attachments: Vec<AttachmentRecord>,
    /// Set when the message was sent to a group.
    #[serde(rename = "groupInfo", default)]
    pub group_info: Option<GroupInfo>,
}

/// Sync payload inside an envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncMessage {
    /// The message this account sent from another device.
    #[serde(rename = "sentMessage", default)]
    pub sent_message: Option<SentMessage>,
}

/// A message sent by this account, as mirrored by a sync envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    /// Direct destination identity; absent for group messages.
    #[serde(default)]
    pub destination: Option<String>,
    /// Message body.
    #[serde(default)]
    pub message: Option<String>,
    /// Attachment descriptors.
    #[serde(default)]
    pub attachments: Vec<AttachmentRecord>,
    /// Set when the message went to a group.
    #[serde(rename = "groupInfo", default)]
    pub group_info: Option<GroupInfo>,
}

/// Group reference inside a message payload (`groupInfo.groupId`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupInfo {
    /// Stable group identifier.
    #[serde(rename = "groupId")]
    pub group_id: String,
}

/// One attachment descriptor inside a message payload.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentRecord {
    /// Storage identifier assigned by the subprocess.
    pub id: String,
    /// Original filename, when the sender provided one.
    #[serde(default)]
    pub filename: Option<String>,
    /// MIME content type.
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
}
