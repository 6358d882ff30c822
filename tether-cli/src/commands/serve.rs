//! `tether serve`: foreground echo server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use tether_echo::{start_blocking, EchoConfig, DEFAULT_CHUNK_SIZE};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to bind.
    pub socket: PathBuf,

    /// Echo at most this many bytes per read/write (small values force short I/O).
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        let stats = start_blocking(&self.socket, EchoConfig::constrained(self.chunk_size))
            .context("echo server exited with error")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("failed to render server stats")?
        );
        Ok(())
    }
}
