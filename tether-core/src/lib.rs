//! Tether core: client transport over local (Unix domain) stream sockets.
//!
//! - [`Connection`]: connect, read, write, close one socket
//! - [`SocketAddress`]: path validation against `sun_path` capacity
//! - [`endpoint`]: display-server socket path resolution
//! - [`error`]: [`ConnectError`], [`TransportError`] and friends
//!
//! Payloads are opaque bytes; framing belongs to the protocol built on top.

pub mod address;
pub mod connection;
pub mod endpoint;
pub mod error;

pub use address::{sun_path_capacity, SocketAddress};
pub use connection::{write_all, Connection, ConnectionState, READ_CHUNK};
pub use error::{AddressError, ConnectError, EndpointError, Operation, TransportError};
