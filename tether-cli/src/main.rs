//! Tether: poke at local stream sockets from the shell.
//!
//! # Usage
//!
//! ```text
//! tether send [--socket <path>] <data> [--read <n>] [--timeout-ms <ms>]
//! tether probe [--socket <path>] [--json]
//! tether serve <path> [--chunk-size <n>]
//! ```
//!
//! Without `--socket`, the endpoint is `$XDG_RUNTIME_DIR/$WAYLAND_DISPLAY`.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{probe::ProbeArgs, send::SendArgs, serve::ServeArgs};

#[derive(Parser, Debug)]
#[command(
    name = "tether",
    version,
    about = "Connect to, probe and serve local stream sockets",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send bytes to a socket and optionally read a reply.
    Send(SendArgs),

    /// Check whether a socket accepts connections.
    Probe(ProbeArgs),

    /// Run an echo server in the foreground.
    Serve(ServeArgs),
}

fn main() -> Result<()> {
    tether_echo::init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Send(args) => args.run(),
        Commands::Probe(args) => args.run(),
        Commands::Serve(args) => args.run(),
    }
}
