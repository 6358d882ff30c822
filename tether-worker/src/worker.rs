//! Threads that can be cancelled without waiting for them.
//!
//! Cancellation is a request: the task sees it through its [`StopToken`]
//! and decides when to return.

use std::any::Any;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{SpawnError, WorkerError};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const RUNNING: u8 = 0;
const CANCELLED: u8 = 1;
const COMPLETED: u8 = 2;

/// Opaque process-unique worker identity. Only used to address a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Running,
    /// Cancellation was requested; the task may still be running.
    Cancelled,
    /// The task returned (or unwound) before any cancellation request.
    Completed,
}

impl WorkerStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            RUNNING => WorkerStatus::Running,
            CANCELLED => WorkerStatus::Cancelled,
            _ => WorkerStatus::Completed,
        }
    }
}

/// Cooperative stop signal shared between a [`Worker`] and its task.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

#[derive(Debug)]
struct Shared {
    status: AtomicU8,
}

/// Lives on the worker thread; marks completion on return and on unwind.
struct CompletionGuard {
    id: WorkerId,
    shared: Arc<Shared>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let completed = self
            .shared
            .status
            .compare_exchange(RUNNING, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        tracing::debug!(id = %self.id, completed, "worker task finished");
    }
}

/// Thread configuration applied before spawning.
#[derive(Debug, Clone, Default)]
pub struct WorkerBuilder {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thread name; defaults to the worker id.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub fn spawn<F>(self, task: F) -> Result<Worker, SpawnError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_cooperative(move |_stop| task())
    }

    /// Spawn `task`, handing it the worker's [`StopToken`].
    ///
    /// If the OS cannot create the thread, `task` is dropped without running.
    pub fn spawn_cooperative<F>(self, task: F) -> Result<Worker, SpawnError>
    where
        F: FnOnce(StopToken) + Send + 'static,
    {
        let id = WorkerId::next();
        let name = self.name.unwrap_or_else(|| id.to_string());
        if name.contains('\0') {
            return Err(SpawnError {
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "thread name contains an interior NUL byte",
                ),
            });
        }
        let stop = StopToken::default();
        let shared = Arc::new(Shared {
            status: AtomicU8::new(RUNNING),
        });

        let mut builder = thread::Builder::new().name(name);
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }

        let task_stop = stop.clone();
        let task_shared = Arc::clone(&shared);
        let handle = builder
            .spawn(move || {
                let _guard = CompletionGuard {
                    id,
                    shared: task_shared,
                };
                task(task_stop);
            })
            .map_err(|source| SpawnError { source })?;

        tracing::debug!(%id, "worker spawned");
        Ok(Worker {
            id,
            stop,
            shared,
            handle,
        })
    }
}

/// A task running on its own OS thread.
///
/// Dropping a `Worker` detaches it: the task keeps running and is no longer
/// addressable.
#[derive(Debug)]
pub struct Worker {
    id: WorkerId,
    stop: StopToken,
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Run `task` on a new thread and return without waiting for it.
    pub fn spawn<F>(task: F) -> Result<Self, SpawnError>
    where
        F: FnOnce() + Send + 'static,
    {
        WorkerBuilder::new().spawn(task)
    }

    /// Run `task` on a new thread, passing it the stop token.
    pub fn spawn_cooperative<F>(task: F) -> Result<Self, SpawnError>
    where
        F: FnOnce(StopToken) + Send + 'static,
    {
        WorkerBuilder::new().spawn_cooperative(task)
    }

    pub fn builder() -> WorkerBuilder {
        WorkerBuilder::new()
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus::from_raw(self.shared.status.load(Ordering::Acquire))
    }

    /// True once the thread has exited, whatever the status says.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Request cancellation and return immediately.
    ///
    /// The task is not interrupted: a task that never checks its
    /// [`StopToken`] runs to completion. Cancelling a finished or already
    /// cancelled worker does nothing.
    pub fn cancel(&self) {
        self.stop.request_stop();
        if self
            .shared
            .status
            .compare_exchange(RUNNING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!(id = %self.id, "worker cancellation requested");
        }
    }

    /// Block until the thread exits and report the final status.
    pub fn join(self) -> Result<WorkerStatus, WorkerError> {
        let id = self.id;
        self.handle.join().map_err(|payload| WorkerError::Panicked {
            id,
            message: panic_message(payload.as_ref()),
        })?;
        Ok(WorkerStatus::from_raw(
            self.shared.status.load(Ordering::Acquire),
        ))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn ids_are_unique_and_opaque() {
        let ids: HashSet<WorkerId> = (0..100).map(|_| WorkerId::next()).collect();
        assert_eq!(ids.len(), 100);
        let id = WorkerId::next();
        assert!(id.to_string().starts_with("worker-"));
    }

    #[test]
    fn status_decodes_raw_values() {
        assert_eq!(WorkerStatus::from_raw(RUNNING), WorkerStatus::Running);
        assert_eq!(WorkerStatus::from_raw(CANCELLED), WorkerStatus::Cancelled);
        assert_eq!(WorkerStatus::from_raw(COMPLETED), WorkerStatus::Completed);
    }

    #[test]
    fn builder_names_the_thread() {
        let (tx, rx) = mpsc::channel();
        let worker = Worker::builder()
            .name("tether-reader")
            .stack_size(256 * 1024)
            .spawn(move || {
                let _ = tx.send(thread::current().name().map(str::to_string));
            })
            .expect("spawn");
        let name = rx.recv_timeout(Duration::from_secs(2)).expect("task ran");
        assert_eq!(name.as_deref(), Some("tether-reader"));
        assert_eq!(worker.join().expect("join"), WorkerStatus::Completed);
    }

    #[test]
    fn default_thread_name_is_worker_id() {
        let (tx, rx) = mpsc::channel();
        let worker = Worker::spawn(move || {
            let _ = tx.send(thread::current().name().map(str::to_string));
        })
        .expect("spawn");
        let name = rx.recv_timeout(Duration::from_secs(2)).expect("task ran");
        assert_eq!(name, Some(worker.id().to_string()));
    }

    #[test]
    fn panic_payloads_become_messages() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");
        let boxed: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }

    #[test]
    fn nul_in_thread_name_is_a_spawn_error() {
        let ran = Arc::new(AtomicBool::new(false));
        let task_ran = Arc::clone(&ran);
        let err = Worker::builder()
            .name("a\0b")
            .spawn(move || task_ran.store(true, Ordering::SeqCst))
            .unwrap_err();

        assert_eq!(err.source.kind(), io::ErrorKind::InvalidInput);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn spawn_error_names_the_cause() {
        let err = SpawnError {
            source: std::io::Error::from(std::io::ErrorKind::WouldBlock),
        };
        assert!(err.to_string().starts_with("failed to spawn worker thread"));
    }
}
