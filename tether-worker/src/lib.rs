//! Tether worker: run a task on its own OS thread and cancel it later.
//!
//! Cancellation is asynchronous and cooperative: [`Worker::cancel`] raises
//! the worker's [`StopToken`] and returns at once. Tasks that want prompt,
//! deterministic cleanup poll the token (see [`Worker::spawn_cooperative`]);
//! anything a task owns is released by its own scope when it returns.

pub mod error;
pub mod worker;

pub use error::{SpawnError, WorkerError};
pub use worker::{StopToken, Worker, WorkerBuilder, WorkerId, WorkerStatus};
