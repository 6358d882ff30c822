//! Echo peer used to exercise tether connections over real sockets.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::error::{io_err, EchoError};

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoConfig {
    /// Upper bound on bytes per read and per write back to the client.
    pub chunk_size: usize,
}

impl EchoConfig {
    /// Echo at most `chunk_size` bytes at a time (minimum 1).
    pub fn constrained(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EchoStats {
    pub connections: u64,
    pub bytes_echoed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    connections: AtomicU64,
    bytes_echoed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> EchoStats {
        EchoStats {
            connections: self.connections.load(Ordering::Relaxed),
            bytes_echoed: self.bytes_echoed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct EchoServer {
    listener: UnixListener,
    socket: PathBuf,
    chunk_size: usize,
    counters: Arc<Counters>,
}

impl EchoServer {
    /// Bind the listening socket. Must be called inside a tokio runtime.
    ///
    /// A leftover socket file nobody listens on is removed first; a live one
    /// is left alone and reported as [`EchoError::SocketInUse`].
    pub fn bind(socket: impl Into<PathBuf>, config: EchoConfig) -> Result<Self, EchoError> {
        let socket = socket.into();
        prepare_socket_for_bind(&socket)?;

        let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
        set_socket_permissions(&socket)?;
        tracing::info!(
            socket = %socket.display(),
            chunk_size = config.chunk_size,
            "echo server listening",
        );

        Ok(Self {
            listener,
            socket,
            chunk_size: config.chunk_size.max(1),
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Serve clients until `shutdown_rx` fires (or its sender is dropped).
    ///
    /// In-flight clients are aborted on shutdown and the socket file is
    /// removed before returning.
    pub async fn run(
        self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<EchoStats, EchoError> {
        let mut clients = JoinSet::new();

        let outcome = loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break Ok(()),
                accepted = self.listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(err) => break Err(io_err(&self.socket, err)),
                    };
                    let client = self.counters.connections.fetch_add(1, Ordering::Relaxed) + 1;
                    let counters = Arc::clone(&self.counters);
                    let chunk_size = self.chunk_size;
                    clients.spawn(async move {
                        match echo_client(stream, chunk_size, &counters).await {
                            Ok(()) => tracing::debug!(client, "echo client finished"),
                            Err(err) if is_peer_gone(&err) => {
                                tracing::debug!(client, error = %err, "echo client went away");
                            }
                            Err(err) => tracing::warn!(client, error = %err, "echo client error"),
                        }
                    });
                }
                Some(_) = clients.join_next(), if !clients.is_empty() => {}
            }
        };

        clients.shutdown().await;
        drop(self.listener);
        if self.socket.exists() {
            let _ = fs::remove_file(&self.socket);
        }

        outcome?;
        let stats = self.counters.snapshot();
        tracing::info!(
            connections = stats.connections,
            bytes_echoed = stats.bytes_echoed,
            "echo server stopped",
        );
        Ok(stats)
    }
}

async fn echo_client(
    mut stream: UnixStream,
    chunk_size: usize,
    counters: &Counters,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        stream.write_all(&buf[..n]).await?;
        counters.bytes_echoed.fetch_add(n as u64, Ordering::Relaxed);
    }
}

fn is_peer_gone(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset
    )
}

/// Echo server running on its own thread and runtime.
#[derive(Debug)]
pub struct EchoHandle {
    socket: PathBuf,
    shutdown_tx: broadcast::Sender<()>,
    thread: Option<JoinHandle<Result<EchoStats, EchoError>>>,
}

impl EchoHandle {
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Shut the server down and wait for its thread.
    pub fn stop(mut self) -> Result<EchoStats, EchoError> {
        self.shutdown_and_join()
    }

    fn shutdown_and_join(&mut self) -> Result<EchoStats, EchoError> {
        let Some(thread) = self.thread.take() else {
            return Ok(EchoStats::default());
        };
        let _ = self.shutdown_tx.send(());
        thread
            .join()
            .map_err(|_| EchoError::ServerThread("echo server thread panicked".to_string()))?
    }
}

impl Drop for EchoHandle {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown_and_join() {
            tracing::warn!(error = %err, "echo server did not shut down cleanly");
        }
    }
}

/// Start an echo server on a background thread.
///
/// Returns once the socket is bound, so clients may connect immediately.
pub fn spawn_background(
    socket: impl Into<PathBuf>,
    config: EchoConfig,
) -> Result<EchoHandle, EchoError> {
    let socket = socket.into();
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), EchoError>>();

    let thread_socket = socket.clone();
    let thread = thread::Builder::new()
        .name("tether-echo".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    let _ = ready_tx.send(Err(io_err("tokio-runtime", err)));
                    return Err(EchoError::ServerThread("runtime build failed".to_string()));
                }
            };
            runtime.block_on(async move {
                let server = match EchoServer::bind(thread_socket, config) {
                    Ok(server) => server,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return Err(EchoError::ServerThread("bind failed".to_string()));
                    }
                };
                let _ = ready_tx.send(Ok(()));
                server.run(shutdown_rx).await
            })
        })
        .map_err(|e| io_err(&socket, e))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(EchoHandle {
            socket,
            shutdown_tx,
            thread: Some(thread),
        }),
        Ok(Err(err)) => {
            let _ = thread.join();
            Err(err)
        }
        Err(_) => {
            let _ = thread.join();
            Err(EchoError::ServerThread(
                "echo server thread exited before binding".to_string(),
            ))
        }
    }
}

/// Run an echo server in the foreground until ctrl-c.
pub fn start_blocking(socket: &Path, config: EchoConfig) -> Result<EchoStats, EchoError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    runtime.block_on(async {
        let server = EchoServer::bind(socket, config)?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("received ctrl-c, shutting down echo server");
                    let _ = shutdown_tx.send(());
                }
                Err(err) => tracing::error!(error = %err, "ctrl-c handler failed"),
            }
        });
        server.run(shutdown_rx).await
    })
}

/// Install a stderr fmt subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), EchoError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(EchoError::SocketInUse {
                socket: socket.to_path_buf(),
            });
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn set_socket_permissions(path: &Path) -> Result<(), EchoError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
