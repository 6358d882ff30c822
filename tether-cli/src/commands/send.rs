//! `tether send`: one request/reply exchange on a background worker.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use tether_core::{write_all, Connection, READ_CHUNK};
use tether_worker::Worker;

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path (defaults to the display socket from the environment).
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Bytes to send, taken verbatim.
    pub data: String,

    /// Read up to this many reply bytes (stops early at end-of-stream).
    #[arg(long)]
    pub read: Option<usize>,

    /// Give up if the exchange has not finished after this many milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug)]
struct Exchange {
    writes: usize,
    reply: Option<Vec<u8>>,
}

impl SendArgs {
    pub fn run(self) -> Result<()> {
        let socket = super::resolve_socket(self.socket)?;
        let data = self.data.into_bytes();
        let read = self.read;

        // The exchange blocks, so it runs on a worker and the deadline is
        // enforced here by waiting on the result channel.
        let (tx, rx) = mpsc::channel();
        let task_socket = socket.clone();
        let worker = Worker::builder()
            .name("tether-send")
            .spawn_cooperative(move |stop| {
                let result = exchange(&task_socket, &data, read);
                if !stop.is_stop_requested() {
                    let _ = tx.send(result);
                }
            })
            .context("failed to start send worker")?;

        let outcome = match self.timeout_ms {
            Some(ms) => match rx.recv_timeout(Duration::from_millis(ms)) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => {
                    worker.cancel();
                    bail!("no reply from {} within {ms} ms", socket.display());
                }
                Err(RecvTimeoutError::Disconnected) => bail!("send worker exited without a result"),
            },
            None => rx.recv().context("send worker exited without a result")?,
        };
        let exchange = outcome?;

        if let Some(reply) = exchange.reply {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&reply).context("failed to write reply")?;
            stdout.flush().context("failed to flush stdout")?;
        }
        eprintln!(
            "sent to {} in {} write(s)",
            socket.display(),
            exchange.writes
        );
        Ok(())
    }
}

fn exchange(socket: &Path, data: &[u8], read: Option<usize>) -> Result<Exchange> {
    let mut conn = Connection::connect(socket)?;
    let writes = write_all(&mut conn, data)?;
    let reply = match read {
        Some(max_len) => Some(read_up_to(&mut conn, max_len)?),
        None => None,
    };
    conn.close();
    Ok(Exchange { writes, reply })
}

fn read_up_to(conn: &mut Connection, max_len: usize) -> Result<Vec<u8>> {
    let mut reply = Vec::with_capacity(max_len.min(READ_CHUNK));
    while reply.len() < max_len {
        let chunk = conn.read(max_len - reply.len())?;
        if chunk.is_empty() {
            break;
        }
        reply.extend_from_slice(&chunk);
    }
    Ok(reply)
}
