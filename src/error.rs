//! Error types for sigbridge.

use thiserror::Error;

/// Main error type for all bridge operations.
///
/// Per-envelope parse failures are deliberately *not* part of this enum;
/// they are recoverable skip decisions and live in
/// [`EnvelopeError`](crate::model::EnvelopeError). Everything here either
/// terminates the bridge or is raised directly to the caller.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Required configuration is missing or invalid (e.g. no account).
    #[error("configuration error: {0}")]
    Config(String),

    /// The subprocess failed to launch.
    #[error("failed to start subprocess `{bin}`: {source}")]
    ProcessStart {
        /// Binary path we tried to execute.
        bin: String,
        /// Underlying spawn error.
        source: std::io::Error,
    },

    /// I/O error on one of the subprocess streams.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed inbound JSON line.
    ///
    /// Non-fatal at the reader: the line is skipped and the stream continues.
    #[error("JSON decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The subprocess speaks an unsupported protocol version.
    #[error("unsupported protocol version {found} (expected {})", crate::protocol::API_VERSION)]
    ProtocolVersion {
        /// Version reported by the subprocess.
        found: i64,
    },

    /// Subscription to an event name that does not exist.
    #[error("unknown event name: {0:?}")]
    UnknownEvent(String),

    /// Recipient kind is neither "direct" nor "group".
    #[error("invalid recipient kind: {0:?}")]
    InvalidRecipientKind(String),

    /// A queue endpoint was closed because its task has already finished.
    #[error("queue closed")]
    QueueClosed,
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
