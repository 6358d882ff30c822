//! Short transfers through a constrained echo peer.

use rstest::rstest;
use tempfile::TempDir;
use tether_core::Connection;
use tether_echo::{spawn_background, EchoConfig};

/// Bytes offered per write; small enough that echoed data always fits the
/// socket buffers while we alternate between writing and reading.
const WINDOW: usize = 4096;

fn short_tempdir() -> TempDir {
    tempfile::Builder::new()
        .prefix("ts")
        .tempdir_in("/tmp")
        .expect("tempdir")
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

#[rstest]
#[case(1, 64)]
#[case(7, 16 * 1024)]
#[case(1024, 256 * 1024)]
fn looping_on_short_io_reconstructs_payload(#[case] chunk_size: usize, #[case] len: usize) {
    let dir = short_tempdir();
    let socket = dir.path().join("echo.sock");
    let server = spawn_background(&socket, EchoConfig::constrained(chunk_size)).expect("echo");
    let mut conn = Connection::connect(&socket).expect("connect");

    let sent = payload(len);
    let mut offset = 0;
    let mut received = Vec::with_capacity(len);
    let mut short_reads = 0usize;

    while offset < len {
        let end = (offset + WINDOW).min(len);
        let written = conn.write(&sent[offset..end]).expect("write");
        assert!(written > 0, "write accepted nothing");
        offset += written;

        // Only `offset` bytes have been sent, so asking for the rest of the
        // payload over-asks whenever more remains to be written.
        while received.len() < offset {
            let requested = len - received.len();
            let chunk = conn.read(requested).expect("read");
            assert!(!chunk.is_empty(), "unexpected end-of-stream");
            if chunk.len() < requested {
                short_reads += 1;
            }
            received.extend_from_slice(&chunk);
        }
    }

    assert_eq!(received, sent);
    if len > WINDOW {
        assert!(short_reads > 0, "expected at least one short read");
    }

    conn.shutdown_write().expect("shutdown");
    assert!(
        conn.read(16).expect("end-of-stream").is_empty(),
        "echo peer closes after our half-close"
    );
    conn.close();

    let stats = server.stop().expect("stop");
    assert_eq!(stats.bytes_echoed, len as u64);
}
