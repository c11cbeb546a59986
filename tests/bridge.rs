//! End-to-end lifecycle tests against a scripted fake subprocess.
//!
//! Each test materializes a small shell script standing in for the real
//! external binary: it writes protocol lines to stdout and captures what
//! the bridge writes to its stdin, which is exactly the contract the
//! bridge cares about.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sigbridge::{
    Bridge, BridgeError, DiagnosticOrigin, EventPayload, Message, RecipientKind,
};

const CONTACTS_LINE: &str = r#"{"apiVer":2,"respType":"list_contacts","data":[{"number":"+100","name":"Alice","color":"red","profileKey":null,"blocked":false}]}"#;
const ENVELOPE_LINE: &str = r#"{"apiVer":2,"respType":"envelope","envelope":{"timestamp":1000,"source":"+100","sourceDevice":1,"dataMessage":{"message":"hi","attachments":[],"groupInfo":null},"syncMessage":null}}"#;

/// Write an executable fake-subprocess script into `dir`.
fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-signal-cli");
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Poll `predicate` until it holds or the timeout elapses.
async fn wait_for(predicate: impl Fn() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !predicate() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Parse every JSON line the fake subprocess captured from its stdin.
fn captured_requests(capture: &Path) -> Vec<serde_json::Value> {
    let Ok(raw) = std::fs::read_to_string(capture) else {
        return Vec::new();
    };
    // The last line may still be mid-write; incomplete JSON is skipped
    // and picked up on the next poll.
    raw.lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

#[tokio::test]
async fn test_stdout_eof_drives_orderly_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    // The script emits a directory snapshot, a malformed line, and one
    // envelope, then exits — closing stdout.
    let script = write_script(
        dir.path(),
        &format!(
            "#!/bin/sh\necho '{CONTACTS_LINE}'\necho 'this is not json'\necho '{ENVELOPE_LINE}'\n"
        ),
    );

    let bridge = Bridge::builder()
        .bin_path(script.to_str().unwrap())
        .account("+999")
        .start()
        .unwrap();

    let messages: Arc<Mutex<Vec<Message>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    bridge
        .on(
            "message",
            Box::new(move |payload| {
                if let EventPayload::Message(message) = payload {
                    sink.lock().unwrap().push(message.clone());
                }
                Ok(())
            }),
        )
        .unwrap();

    let decode_errors = Arc::new(Mutex::new(0u32));
    let sink = decode_errors.clone();
    bridge
        .on(
            "error",
            Box::new(move |payload| {
                if let EventPayload::Error(diagnostic) = payload {
                    if diagnostic.origin == DiagnosticOrigin::Decode {
                        *sink.lock().unwrap() += 1;
                    }
                }
                Ok(())
            }),
        )
        .unwrap();

    let handle = bridge.handle();
    // run() resolves on its own once the script exits.
    tokio::time::timeout(Duration::from_secs(10), bridge.run())
        .await
        .unwrap()
        .unwrap();

    // The malformed line was skipped with one diagnostic; the envelope
    // after it still went through, with the sender resolved against the
    // snapshot that arrived first.
    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body, "hi");
    assert_eq!(messages[0].sender_contact.as_ref().unwrap().name, "Alice");
    assert_eq!(*decode_errors.lock().unwrap(), 1);

    // Shutdown already ran; another request is a quiet no-op.
    handle.shutdown().await;
}

#[tokio::test]
async fn test_outbound_requests_reach_subprocess_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("capture.jsonl");
    let script = write_script(
        dir.path(),
        &format!(
            "#!/bin/sh\n\
             echo '{{\"apiVer\":2,\"respType\":\"metadata\",\"data\":{{\"attachmentsDir\":\"/tmp/att\"}}}}'\n\
             echo '{CONTACTS_LINE}'\n\
             echo '{ENVELOPE_LINE}'\n\
             cat > '{}' 2>/dev/null\n",
            capture.display()
        ),
    );

    let bridge = Bridge::builder()
        .bin_path(script.to_str().unwrap())
        .account("+999")
        .start()
        .unwrap();

    // Auto-reply from inside the message callback via a cloned handle.
    let reply_handle = bridge.handle();
    bridge
        .on(
            "message",
            Box::new(move |payload| {
                if let EventPayload::Message(message) = payload {
                    let handle = reply_handle.clone();
                    let message = message.clone();
                    tokio::spawn(async move {
                        let _ = handle.reply(&message, "pong", vec![], false).await;
                    });
                }
                Ok(())
            }),
        )
        .unwrap();

    let handle = bridge.handle();
    let runner = tokio::spawn(bridge.run());

    handle
        .send_message("+200", "hello", RecipientKind::Direct, vec![])
        .await
        .unwrap();

    // Wait until the directory refresh, the application send, and the
    // auto-reply have all hit the subprocess.
    wait_for(
        || {
            let requests = captured_requests(&capture);
            let types: Vec<&str> = requests
                .iter()
                .filter_map(|r| r["reqType"].as_str())
                .collect();
            types.contains(&"list_contacts")
                && types.contains(&"list_groups")
                && types.iter().filter(|t| **t == "send_message").count() >= 2
        },
        "all outbound requests",
    )
    .await;

    handle.shutdown().await;
    tokio::time::timeout(Duration::from_secs(10), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let requests = captured_requests(&capture);

    // Every request carries a unique reqID.
    let ids: Vec<u64> = requests.iter().map(|r| r["reqID"].as_u64().unwrap()).collect();
    let mut deduped = ids.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(ids.len(), deduped.len(), "reqIDs must be unique");

    // The refresh pair is enqueued by the dispatcher in a fixed order.
    let contacts_pos = requests
        .iter()
        .position(|r| r["reqType"] == "list_contacts")
        .unwrap();
    let groups_pos = requests
        .iter()
        .position(|r| r["reqType"] == "list_groups")
        .unwrap();
    assert!(contacts_pos < groups_pos);

    // The explicit send targeted +200 directly.
    let send = requests
        .iter()
        .find(|r| r["recipient"]["number"] == "+200")
        .expect("explicit send captured");
    assert_eq!(send["reqType"], "send_message");
    assert_eq!(send["dataMessage"]["message"], "hello");

    // The reply to the incoming direct message targeted its sender.
    let reply = requests
        .iter()
        .find(|r| r["recipient"]["number"] == "+100")
        .expect("auto-reply captured");
    assert_eq!(reply["dataMessage"]["message"], "pong");
}

#[tokio::test]
async fn test_liveness_probes_are_enqueued_periodically() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("capture.jsonl");
    let script = write_script(
        dir.path(),
        &format!("#!/bin/sh\ncat > '{}' 2>/dev/null\n", capture.display()),
    );

    let bridge = Bridge::builder()
        .bin_path(script.to_str().unwrap())
        .account("+999")
        .liveness_check(true)
        .liveness_period(Duration::from_millis(50))
        .start()
        .unwrap();

    let handle = bridge.handle();
    let runner = tokio::spawn(bridge.run());

    wait_for(
        || {
            captured_requests(&capture)
                .iter()
                .filter(|r| r["reqType"] == "alive")
                .count()
                >= 2
        },
        "two liveness probes",
    )
    .await;

    handle.shutdown().await;
    tokio::time::timeout(Duration::from_secs(10), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_protocol_version_mismatch_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    // Keep stdout open after the bad metadata so the error, not EOF, is
    // what brings the bridge down.
    let script = write_script(
        dir.path(),
        "#!/bin/sh\necho '{\"apiVer\":3,\"respType\":\"metadata\"}'\nexec sleep 30\n",
    );

    let bridge = Bridge::builder()
        .bin_path(script.to_str().unwrap())
        .account("+999")
        .start()
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(10), bridge.run())
        .await
        .unwrap();
    assert!(matches!(
        result,
        Err(BridgeError::ProtocolVersion { found: 3 })
    ));
}
