//! Group directory entries.

use super::{Contact, ContactDirectory};
use crate::protocol::GroupRecord;

/// Directory entry for a multi-party chat.
///
/// Members are stored as identities only. Resolution against the contact
/// directory happens at read time via [`Group::resolve_members`], so the
/// result always reflects the latest contact state instead of a copy taken
/// when the group snapshot arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Group display name.
    pub name: String,
    /// Stable group identifier, the directory key.
    pub id: String,
    /// Color tag assigned by the subprocess.
    pub color: String,
    /// Whether the account has blocked this group.
    pub blocked: bool,
    /// Whether the account is an active member.
    pub active: bool,
    /// Member identities, in subprocess order.
    pub members: Vec<String>,
}

impl Group {
    /// Build a group from a directory snapshot record.
    pub fn from_record(record: GroupRecord) -> Self {
        Self {
            name: record.name,
            id: record.group_id,
            color: record.color,
            blocked: record.blocked,
            active: record.active,
            members: record.members,
        }
    }

    /// Resolve member identities against the current contact directory.
    ///
    /// Unknown members come back as placeholder contacts.
    pub fn resolve_members(&self, contacts: &ContactDirectory) -> Vec<Contact> {
        self.members
            .iter()
            .map(|number| {
                contacts
                    .get(number)
                    .cloned()
                    .unwrap_or_else(|| Contact::placeholder(number))
            })
            .collect()
    }
}
