pub mod probe;
pub mod send;
pub mod serve;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tether_core::endpoint;

/// An explicit `--socket` wins; otherwise resolve from the environment.
pub(crate) fn resolve_socket(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => endpoint::display_socket_path()
            .context("no --socket given and no display socket in the environment"),
    }
}
