use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the echo server and its background handle.
#[derive(Debug, Error)]
pub enum EchoError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("socket already in use: {socket}")]
    SocketInUse { socket: PathBuf },

    #[error("echo server thread failed: {0}")]
    ServerThread(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> EchoError {
    EchoError::Io {
        path: path.into(),
        source,
    }
}
