//! Error types for tether-worker.

use thiserror::Error;

use crate::worker::WorkerId;

/// The OS refused to create the thread. The task never ran.
#[derive(Debug, Error)]
#[error("failed to spawn worker thread: {source}")]
pub struct SpawnError {
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The task unwound instead of returning.
    #[error("{id} panicked: {message}")]
    Panicked { id: WorkerId, message: String },
}
