//! Client side of a local stream socket.
//!
//! A [`Connection`] owns exactly one socket descriptor from a successful
//! handshake until [`Connection::close`] (or drop). Reads and writes are
//! single system calls: short transfers are returned to the caller as-is.

use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use crate::address::SocketAddress;
use crate::error::{ConnectError, Operation, TransportError};

#[cfg(not(target_vendor = "apple"))]
const SOCKET_FLAGS: libc::c_int = libc::SOCK_CLOEXEC;
#[cfg(target_vendor = "apple")]
const SOCKET_FLAGS: libc::c_int = 0;

// Apple platforms lack MSG_NOSIGNAL; SO_NOSIGPIPE is set on the socket instead.
#[cfg(not(target_vendor = "apple"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(target_vendor = "apple")]
const SEND_FLAGS: libc::c_int = 0;

/// Largest buffer a single [`Connection::read`] allocates. Larger requests
/// are served short, like any other short read.
pub const READ_CHUNK: usize = 64 * 1024;

/// Lifecycle state observable on a [`Connection`].
///
/// There is no unconnected state: the only constructor performs the
/// handshake, so a value that exists has connected at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Closed => f.write_str("closed"),
        }
    }
}

/// An exclusively owned, connected local stream socket.
#[derive(Debug)]
pub struct Connection {
    address: SocketAddress,
    /// `Some` exactly while connected.
    fd: Option<OwnedFd>,
}

impl Connection {
    /// Open a stream socket and connect it to the listener at `path`.
    ///
    /// The address is validated before anything is allocated. If the
    /// handshake fails, the freshly allocated socket is closed before the
    /// error is returned.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, ConnectError> {
        let path = path.as_ref();
        let address =
            SocketAddress::new(path).map_err(|reason| ConnectError::AddressInvalid {
                path: path.to_path_buf(),
                reason,
            })?;

        let fd = open_stream_socket().map_err(|source| ConnectError::AllocationFailed { source })?;

        let (raw, len) = address.to_raw();
        // SAFETY: `raw` is an initialised sockaddr_un that outlives the call and
        // `len` never exceeds its size.
        let rc = unsafe {
            libc::connect(
                fd.as_raw_fd(),
                (&raw as *const libc::sockaddr_un).cast::<libc::sockaddr>(),
                len,
            )
        };
        if rc < 0 {
            let source = io::Error::last_os_error();
            drop(fd);
            tracing::debug!(path = %path.display(), error = %source, "connect failed");
            return Err(ConnectError::from_handshake(path, source));
        }

        tracing::debug!(path = %path.display(), fd = fd.as_raw_fd(), "connected");
        Ok(Self {
            address,
            fd: Some(fd),
        })
    }

    pub fn path(&self) -> &Path {
        self.address.path()
    }

    pub fn state(&self) -> ConnectionState {
        if self.fd.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Closed
        }
    }

    pub fn is_connected(&self) -> bool {
        self.fd.is_some()
    }

    /// Read up to `max_len` bytes with a single `read(2)`.
    ///
    /// An empty result for `max_len > 0` means the peer closed its write
    /// side. `max_len == 0` returns an empty result without touching the
    /// socket. At most [`READ_CHUNK`] bytes are returned per call.
    pub fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        self.live_fd(Operation::Read)?;
        let mut buf = vec![0u8; max_len.min(READ_CHUNK)];
        let n = self.read_into(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Like [`read`](Self::read), filling the front of `buf`.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let fd = self.live_fd(Operation::Read)?;
        if buf.is_empty() {
            return Ok(0);
        }
        // SAFETY: `buf` is valid for writes of `buf.len()` bytes for the whole call.
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast::<libc::c_void>(), buf.len()) };
        if n < 0 {
            return Err(self.io_error(Operation::Read, io::Error::last_os_error()));
        }
        Ok(n as usize)
    }

    /// Send `bytes` with a single call and return how many were accepted.
    ///
    /// Fewer than `bytes.len()` is a normal outcome; see [`write_all`] for
    /// the caller-side loop. A vanished peer surfaces as an error whose kind
    /// is `BrokenPipe`, never as SIGPIPE.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let fd = self.live_fd(Operation::Write)?;
        // SAFETY: `bytes` is valid for reads of `bytes.len()` bytes for the whole call.
        let n = unsafe {
            libc::send(
                fd,
                bytes.as_ptr().cast::<libc::c_void>(),
                bytes.len(),
                SEND_FLAGS,
            )
        };
        if n < 0 {
            return Err(self.io_error(Operation::Write, io::Error::last_os_error()));
        }
        Ok(n as usize)
    }

    /// Half-close: the peer reads end-of-stream, this side can still read.
    pub fn shutdown_write(&mut self) -> Result<(), TransportError> {
        let fd = self.live_fd(Operation::Shutdown)?;
        // SAFETY: shutdown(2) takes no pointers; `fd` is owned by `self`.
        let rc = unsafe { libc::shutdown(fd, libc::SHUT_WR) };
        if rc < 0 {
            return Err(self.io_error(Operation::Shutdown, io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Release the descriptor. Further calls are no-ops.
    pub fn close(&mut self) {
        if let Some(fd) = self.fd.take() {
            let raw = fd.as_raw_fd();
            drop(fd);
            tracing::debug!(path = %self.path().display(), fd = raw, "connection closed");
        }
    }

    fn live_fd(&self, op: Operation) -> Result<RawFd, TransportError> {
        self.fd
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or_else(|| TransportError::InvalidState {
                op,
                path: self.path().to_path_buf(),
            })
    }

    fn io_error(&self, op: Operation, source: io::Error) -> TransportError {
        TransportError::Io {
            op,
            path: self.path().to_path_buf(),
            source,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl io::Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(io::Error::from)
    }
}

impl io::Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Connection::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.live_fd(Operation::Write)?;
        Ok(())
    }
}

/// Write every byte of `bytes`, looping over short writes.
///
/// Returns the number of `write` calls it took. Interrupted calls are
/// retried; a call accepting zero bytes is reported as `WriteZero`.
pub fn write_all(conn: &mut Connection, mut bytes: &[u8]) -> Result<usize, TransportError> {
    let mut calls = 0;
    while !bytes.is_empty() {
        let n = match conn.write(bytes) {
            Ok(0) => {
                return Err(TransportError::Io {
                    op: Operation::Write,
                    path: PathBuf::from(conn.path()),
                    source: io::ErrorKind::WriteZero.into(),
                })
            }
            Ok(n) => n,
            Err(TransportError::Io { source, .. })
                if source.kind() == io::ErrorKind::Interrupted =>
            {
                continue
            }
            Err(err) => return Err(err),
        };
        calls += 1;
        bytes = &bytes[n..];
    }
    Ok(calls)
}

fn open_stream_socket() -> io::Result<OwnedFd> {
    // SAFETY: socket(2) takes no pointers.
    let raw = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM | SOCKET_FLAGS, 0) };
    if raw < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `raw` is a fresh descriptor from socket(2) that nothing else owns.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    #[cfg(target_vendor = "apple")]
    configure_apple_socket(&fd)?;

    Ok(fd)
}

#[cfg(target_vendor = "apple")]
fn configure_apple_socket(fd: &OwnedFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    // SAFETY: fcntl(2) on a descriptor we own; F_SETFD takes an integer argument.
    if unsafe { libc::fcntl(raw, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    let on: libc::c_int = 1;
    // SAFETY: `on` outlives the call and the length matches its type.
    let rc = unsafe {
        libc::setsockopt(
            raw,
            libc::SOL_SOCKET,
            libc::SO_NOSIGPIPE,
            (&on as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
