//! Callback registry and event dispatch.
//!
//! The registry maps a closed set of event kinds to ordered subscriber
//! lists. Subscribing returns an opaque token for later removal; callbacks
//! run in registration order. Bound extra arguments from the original
//! callback model are closure captures here.
//!
//! A callback returning `Err` is logged and never suppresses later
//! callbacks for the same event.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = CallbackRegistry::new();
//! let token = registry.subscribe(EventKind::Message, Box::new(|payload| {
//!     println!("{:?}", payload);
//!     Ok(())
//! }));
//! registry.unsubscribe(token);
//! ```

use std::str::FromStr;

use crate::error::{BridgeError, Result};
use crate::model::Message;

/// Event names subscribers can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A received or synced message was constructed.
    Message,
    /// A non-fatal diagnostic: decode failure, subprocess stderr output,
    /// or an unrecognized protocol message.
    Error,
}

impl FromStr for EventKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "message" => Ok(EventKind::Message),
            "error" => Ok(EventKind::Error),
            other => Err(BridgeError::UnknownEvent(other.to_string())),
        }
    }
}

/// Where a diagnostic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticOrigin {
    /// A line the subprocess wrote to stderr.
    Stderr,
    /// An inbound stdout line that was not valid JSON.
    Decode,
    /// A protocol-level anomaly (e.g. unrecognized response type).
    Protocol,
}

/// Payload of an `error` event.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Origin of the diagnostic.
    pub origin: DiagnosticOrigin,
    /// Human-readable detail.
    pub detail: String,
}

/// Payload handed to subscribers.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// Payload for [`EventKind::Message`].
    Message(Message),
    /// Payload for [`EventKind::Error`].
    Error(Diagnostic),
}

impl EventPayload {
    fn kind(&self) -> EventKind {
        match self {
            EventPayload::Message(_) => EventKind::Message,
            EventPayload::Error(_) => EventKind::Error,
        }
    }
}

/// Subscriber callback. Errors are isolated per invocation.
pub type Callback = Box<dyn FnMut(&EventPayload) -> Result<()> + Send>;

/// Opaque handle returned by [`CallbackRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackToken(u64);

struct CallbackEntry {
    token: CallbackToken,
    callback: Callback,
}

/// Registry mapping event kinds to ordered subscriber lists.
pub struct CallbackRegistry {
    message: Vec<CallbackEntry>,
    error: Vec<CallbackEntry>,
    next_token: u64,
}

impl CallbackRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            message: Vec::new(),
            error: Vec::new(),
            next_token: 1,
        }
    }

    /// Register a callback for an event. Returns a removal token.
    pub fn subscribe(&mut self, kind: EventKind, callback: Callback) -> CallbackToken {
        let token = CallbackToken(self.next_token);
        self.next_token += 1;
        self.list_mut(kind).push(CallbackEntry { token, callback });
        token
    }

    /// Remove the callback registered under `token`.
    ///
    /// Removing an absent token is a silent no-op.
    pub fn unsubscribe(&mut self, token: CallbackToken) {
        self.message.retain(|entry| entry.token != token);
        self.error.retain(|entry| entry.token != token);
    }

    /// Invoke every subscriber for the payload's event, in registration
    /// order. A failing subscriber is logged and later subscribers still
    /// run.
    pub fn dispatch(&mut self, payload: &EventPayload) {
        let kind = payload.kind();
        for entry in self.list_mut(kind) {
            if let Err(e) = (entry.callback)(payload) {
                tracing::error!(event = ?kind, "callback failed: {}", e);
            }
        }
    }

    /// Number of subscribers for an event kind.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Message => self.message.len(),
            EventKind::Error => self.error.len(),
        }
    }

    fn list_mut(&mut self, kind: EventKind) -> &mut Vec<CallbackEntry> {
        match kind {
            EventKind::Message => &mut self.message,
            EventKind::Error => &mut self.error,
        }
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn diagnostic_payload() -> EventPayload {
        EventPayload::Error(Diagnostic {
            origin: DiagnosticOrigin::Protocol,
            detail: "test".to_string(),
        })
    }

    #[test]
    fn test_event_kind_parsing() {
        assert_eq!("message".parse::<EventKind>().unwrap(), EventKind::Message);
        assert_eq!("error".parse::<EventKind>().unwrap(), EventKind::Error);
        assert!(matches!(
            "typing".parse::<EventKind>(),
            Err(BridgeError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();

        for i in 0..3 {
            let seen = seen.clone();
            registry.subscribe(
                EventKind::Error,
                Box::new(move |_| {
                    seen.lock().unwrap().push(i);
                    Ok(())
                }),
            );
        }

        registry.dispatch(&diagnostic_payload());
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_failing_callback_does_not_suppress_later_ones() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();

        registry.subscribe(
            EventKind::Error,
            Box::new(|_| Err(BridgeError::QueueClosed)),
        );
        let seen_clone = seen.clone();
        registry.subscribe(
            EventKind::Error,
            Box::new(move |_| {
                seen_clone.lock().unwrap().push("ran");
                Ok(())
            }),
        );

        registry.dispatch(&diagnostic_payload());
        assert_eq!(*seen.lock().unwrap(), vec!["ran"]);
    }

    #[test]
    fn test_unsubscribe_removes_only_matching_token() {
        let count = Arc::new(Mutex::new(0));
        let mut registry = CallbackRegistry::new();

        let count_a = count.clone();
        let token_a = registry.subscribe(
            EventKind::Error,
            Box::new(move |_| {
                *count_a.lock().unwrap() += 1;
                Ok(())
            }),
        );
        let count_b = count.clone();
        let _token_b = registry.subscribe(
            EventKind::Error,
            Box::new(move |_| {
                *count_b.lock().unwrap() += 10;
                Ok(())
            }),
        );

        registry.unsubscribe(token_a);
        registry.dispatch(&diagnostic_payload());
        assert_eq!(*count.lock().unwrap(), 10);
    }

    #[test]
    fn test_unsubscribe_absent_token_is_noop() {
        let mut registry = CallbackRegistry::new();
        let token = registry.subscribe(EventKind::Message, Box::new(|_| Ok(())));
        registry.unsubscribe(token);
        // Second removal of the same token: silently ignored.
        registry.unsubscribe(token);
        assert_eq!(registry.subscriber_count(EventKind::Message), 0);
    }

    #[test]
    fn test_events_are_independent() {
        let mut registry = CallbackRegistry::new();
        registry.subscribe(EventKind::Message, Box::new(|_| Ok(())));
        assert_eq!(registry.subscriber_count(EventKind::Message), 1);
        assert_eq!(registry.subscriber_count(EventKind::Error), 0);
    }
}
