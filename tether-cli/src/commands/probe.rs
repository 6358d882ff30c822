//! `tether probe`: does anything accept connections on the socket?

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use tether_core::Connection;

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Socket path (defaults to the display socket from the environment).
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Print a JSON report on stdout.
    #[arg(long)]
    pub json: bool,
}

impl ProbeArgs {
    pub fn run(self) -> Result<()> {
        let socket = super::resolve_socket(self.socket)?;

        let outcome = Connection::connect(&socket).map(|mut conn| conn.close());

        if self.json {
            let report = match &outcome {
                Ok(()) => json!({
                    "socket": socket.display().to_string(),
                    "connected": true,
                }),
                Err(err) => json!({
                    "socket": socket.display().to_string(),
                    "connected": false,
                    "error": err.kind(),
                    "message": err.to_string(),
                }),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to render probe JSON")?
            );
        } else if outcome.is_ok() {
            println!("{}: accepting connections", socket.display());
        }

        outcome.context("probe failed")
    }
}
