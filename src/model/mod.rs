//! Domain model: contacts, groups, and messages.
//!
//! Pure data plus construction logic, no I/O. Directory state (the contact
//! and group maps) is owned exclusively by the incoming dispatcher task and
//! replaced wholesale whenever a fresh snapshot arrives from the
//! subprocess; everything here only ever borrows it.

mod contact;
mod group;
mod message;

use std::collections::HashMap;

pub use contact::Contact;
pub use group::Group;
pub use message::{
    Attachment, EnvelopeError, Message, MessageKind, Recipient, RecipientKind,
};

/// Identity → contact mapping, replaced wholesale on each snapshot.
pub type ContactDirectory = HashMap<String, Contact>;

/// Identity → group mapping, replaced wholesale on each snapshot.
pub type GroupDirectory = HashMap<String, Group>;
