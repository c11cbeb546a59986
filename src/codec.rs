//! JSON line framing for the subprocess protocol.
//!
//! The wire format is one JSON object per line, UTF-8, terminated by a
//! single `\n`. The codec is a marker struct with static methods, so call
//! sites read as `LineCodec::encode(..)` / `LineCodec::decode(..)` without
//! carrying codec state around.
//!
//! Decode failures are non-fatal by contract: callers log them and keep
//! reading. An empty (or whitespace-only) line decodes to "no object",
//! which is distinct from a malformed one.

use crate::error::Result;
use crate::protocol::{Request, Response};

/// Line-delimited JSON codec.
pub struct LineCodec;

impl LineCodec {
    /// Encode an outbound request as a newline-terminated JSON line.
    pub fn encode(request: &Request) -> Result<String> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        Ok(line)
    }

    /// Decode one inbound line.
    ///
    /// Returns `Ok(None)` for empty lines, `Ok(Some(response))` for valid
    /// JSON, and `Err(BridgeError::Decode)` for malformed JSON. A decode
    /// error must never terminate the stream reader.
    pub fn decode(line: &str) -> Result<Option<Response>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let response = serde_json::from_str(trimmed)?;
        Ok(Some(response))
    }
}
