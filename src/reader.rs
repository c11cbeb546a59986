//! Stream reader loops for the subprocess's output streams.
//!
//! Both loops are generic over [`AsyncBufRead`] so tests can drive them
//! with in-memory duplex streams instead of a real child process.
//!
//! The stdout reader is the single point of protocol ingestion: decoded
//! objects go onto the incoming queue (suspending when the bounded queue
//! is full, which is the backpressure path), malformed lines are reported
//! and skipped, and end-of-stream ends the loop so the caller can run the
//! shutdown sequence. The stderr reader only surfaces diagnostics; its
//! end-of-stream is quiet and non-fatal.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::codec::LineCodec;
use crate::events::{Diagnostic, DiagnosticOrigin};
use crate::protocol::Response;

/// Read protocol lines from the subprocess stdout until end-of-stream.
///
/// Returns when the stream ends or the incoming queue's receiver is gone;
/// the caller treats either as the shutdown trigger.
pub async fn read_stdout<R>(
    reader: R,
    incoming_tx: mpsc::Sender<Response>,
    diagnostic_tx: mpsc::Sender<Diagnostic>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!("subprocess stdout closed");
                return;
            }
            Err(e) => {
                tracing::warn!("stdout read error: {}", e);
                return;
            }
        };

        match LineCodec::decode(&line) {
            Ok(Some(response)) => {
                if incoming_tx.send(response).await.is_err() {
                    // Dispatcher is gone; nothing left to ingest for.
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("skipping malformed line: {}", e);
                let _ = diagnostic_tx
                    .send(Diagnostic {
                        origin: DiagnosticOrigin::Decode,
                        detail: e.to_string(),
                    })
                    .await;
            }
        }
    }
}

/// Surface subprocess stderr lines as diagnostics until end-of-stream.
///
/// stderr carries operator-facing output, never protocol data; nothing
/// from here reaches the incoming queue, and the stream closing on its
/// own is not a shutdown trigger.
pub async fn read_stderr<R>(reader: R, diagnostic_tx: mpsc::Sender<Diagnostic>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.is_empty() {
                    continue;
                }
                tracing::warn!("subprocess stderr: {}", line);
                let _ = diagnostic_tx
                    .send(Diagnostic {
                        origin: DiagnosticOrigin::Stderr,
                        detail: line,
                    })
                    .await;
            }
            Ok(None) => {
                tracing::debug!("subprocess stderr closed");
                return;
            }
            Err(e) => {
                tracing::warn!("stderr read error: {}", e);
                return;
            }
        }
    }
}
