//! Error types for tether-core.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a path cannot be used as a local socket address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("path is empty")]
    Empty,

    #[error("path contains an interior NUL byte")]
    InteriorNul,

    /// `len` excludes the terminator; `capacity` includes it.
    #[error("path is {len} bytes; the socket address holds {capacity} including the terminator")]
    TooLong { len: usize, capacity: usize },
}

/// Failures of [`Connection::connect`](crate::Connection::connect).
///
/// No variant leaves a socket descriptor behind.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// `socket(2)` could not allocate a descriptor.
    #[error("failed to allocate a local stream socket: {source}")]
    AllocationFailed {
        #[source]
        source: io::Error,
    },

    #[error("invalid socket address {path}: {reason}")]
    AddressInvalid {
        path: PathBuf,
        #[source]
        reason: AddressError,
    },

    #[error("connection refused by {path}")]
    ConnectionRefused { path: PathBuf },

    #[error("no socket found at {path}")]
    NotFound { path: PathBuf },

    #[error("permission denied connecting to {path}")]
    PermissionDenied { path: PathBuf },

    /// Any handshake failure not covered by the variants above.
    #[error("handshake with {path} failed: {source}")]
    Handshake {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ConnectError {
    /// Stable snake_case tag, used in machine-readable output.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectError::AllocationFailed { .. } => "allocation_failed",
            ConnectError::AddressInvalid { .. } => "address_invalid",
            ConnectError::ConnectionRefused { .. } => "connection_refused",
            ConnectError::NotFound { .. } => "not_found",
            ConnectError::PermissionDenied { .. } => "permission_denied",
            ConnectError::Handshake { .. } => "handshake",
        }
    }

    pub(crate) fn from_handshake(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::ConnectionRefused => ConnectError::ConnectionRefused { path },
            io::ErrorKind::NotFound => ConnectError::NotFound { path },
            io::ErrorKind::PermissionDenied => ConnectError::PermissionDenied { path },
            _ => ConnectError::Handshake { path, source },
        }
    }
}

/// Operation named in a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Shutdown,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Shutdown => "shutdown",
        };
        f.write_str(label)
    }
}

/// Failures of I/O on an established [`Connection`](crate::Connection).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection was closed before the call; no I/O was performed.
    #[error("cannot {op} on {path}: connection is closed")]
    InvalidState { op: Operation, path: PathBuf },

    /// The OS rejected the call. The connection stays open.
    #[error("{op} on {path} failed: {source}")]
    Io {
        op: Operation,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    /// True when the peer is gone (broken pipe or reset).
    pub fn is_peer_closed(&self) -> bool {
        matches!(
            self,
            TransportError::Io { source, .. }
                if matches!(
                    source.kind(),
                    io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
                )
        )
    }
}

impl From<TransportError> for io::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io { source, .. } => source,
            err @ TransportError::InvalidState { .. } => {
                io::Error::new(io::ErrorKind::NotConnected, err)
            }
        }
    }
}

/// Failures resolving a display-server endpoint from the environment.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("runtime directory is unknown; set $XDG_RUNTIME_DIR or pass an absolute socket path")]
    RuntimeDirUnset,
}
