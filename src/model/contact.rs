//! Contact directory entries.

use crate::protocol::ContactRecord;

/// Directory entry for a counterpart identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    /// Display name.
    pub name: String,
    /// Stable phone-number-like identity, the directory key.
    pub number: String,
    /// Color tag assigned by the subprocess.
    pub color: String,
    /// Opaque profile key, absent when the contact has none.
    pub profile_key: Option<String>,
    /// Whether the account has blocked this contact.
    pub blocked: bool,
}

impl Contact {
    /// Build a contact from a directory snapshot record.
    pub fn from_record(record: ContactRecord) -> Self {
        Self {
            name: record.name,
            number: record.number,
            color: record.color,
            profile_key: record.profile_key,
            blocked: record.blocked,
        }
    }

    /// Synthesize a placeholder for an identity absent from the directory.
    ///
    /// The identity doubles as the display name; the placeholder is never
    /// stored back into the directory.
    pub fn placeholder(number: &str) -> Self {
        Self {
            name: number.to_string(),
            number: number.to_string(),
            color: String::new(),
            profile_key: None,
            blocked: false,
        }
    }
}
