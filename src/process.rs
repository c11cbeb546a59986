//! Subprocess lifecycle and stream capture.
//!
//! Owns the OS-level child process running the external binary's JSON
//! event loop (`<bin> -u <account> jsonevtloop`). All three standard
//! streams are captured as pipes, never inherited; the stream trio is
//! handed to the reader and writer tasks at spawn time, and the child
//! handle stays here so [`ChildProcess::terminate`] can signal and reap
//! it.
//!
//! This module never interprets payload content.

use std::process::Stdio;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::error::{BridgeError, Result};

/// Subcommand that switches the external binary into its line-delimited
/// JSON event-loop mode.
const EVENT_LOOP_SUBCOMMAND: &str = "jsonevtloop";

/// The captured standard streams of a spawned subprocess.
pub struct ChildStreams {
    /// Write half for protocol requests.
    pub stdin: ChildStdin,
    /// Read half carrying protocol responses.
    pub stdout: ChildStdout,
    /// Read half carrying operator-facing diagnostics.
    pub stderr: ChildStderr,
}

/// Handle to the spawned subprocess.
pub struct ChildProcess {
    child: Option<Child>,
}

impl ChildProcess {
    /// Spawn the external binary in event-loop mode for `account`.
    pub fn spawn(bin: &str, account: &str) -> Result<(Self, ChildStreams)> {
        let mut child = Command::new(bin)
            .arg("-u")
            .arg(account)
            .arg(EVENT_LOOP_SUBCOMMAND)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::ProcessStart {
                bin: bin.to_string(),
                source: e,
            })?;

        let stdin = child.stdin.take().ok_or_else(|| missing_stream("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_stream("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_stream("stderr"))?;
        tracing::debug!(bin, account, "subprocess spawned");

        Ok((
            Self { child: Some(child) },
            ChildStreams {
                stdin,
                stdout,
                stderr,
            },
        ))
    }

    /// Signal the subprocess and reap it. Idempotent: later calls are
    /// no-ops, and a child that already exited is not an error.
    pub async fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Err(e) = child.start_kill() {
            // InvalidInput means the child has already exited.
            if e.kind() != std::io::ErrorKind::InvalidInput {
                tracing::warn!("failed to signal subprocess: {}", e);
            }
        }
        match child.wait().await {
            Ok(status) => tracing::debug!(%status, "subprocess terminated"),
            Err(e) => tracing::warn!("failed to reap subprocess: {}", e),
        }
    }
}

fn missing_stream(name: &str) -> BridgeError {
    BridgeError::Io(std::io::Error::other(format!(
        "subprocess {name} was not captured"
    )))
}

/// Write one pre-framed line and await the flush.
///
/// The line must already carry its trailing `\n` (the codec appends it).
/// Awaiting the flush before the caller writes the next line is what keeps
/// outbound requests strictly ordered on the wire.
pub async fn write_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
