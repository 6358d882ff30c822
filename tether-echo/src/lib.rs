//! Echo peer for tether connections: binds a local socket and sends every
//! byte back, optionally in small chunks to emulate a constrained channel.

mod error;
mod server;

pub use error::EchoError;
pub use server::{
    init_tracing, spawn_background, start_blocking, EchoConfig, EchoHandle, EchoServer, EchoStats,
    DEFAULT_CHUNK_SIZE,
};
