//! Background task spawning.
//!
//! Services never call `tokio::spawn` themselves. They hold a [`Spawner`]
//! handed in by the composition root, so tests can swap in a spawner that
//! counts or records what gets started.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

/// Starts fire-and-forget tasks.
///
/// Object safe so services can share one `Arc<dyn TaskSpawner>`; use
/// [`spawn`](dyn TaskSpawner::spawn) to avoid boxing at call sites.
pub trait TaskSpawner: Send + Sync {
    /// Runs `task` in the background. `name` is for logging only.
    fn spawn_boxed(&self, name: &'static str, task: BoxFuture<'static, ()>);
}

impl dyn TaskSpawner {
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_boxed(name, future.boxed());
    }
}

/// Shared spawner handle.
pub type Spawner = Arc<dyn TaskSpawner>;

/// Spawns onto a Tokio runtime.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Spawner for the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }

    /// Same as [`current`](Self::current), already shared.
    #[must_use]
    pub fn shared() -> Spawner {
        Arc::new(Self::current())
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn_boxed(&self, name: &'static str, task: BoxFuture<'static, ()>) {
        log::trace!("[Runtime] Spawning task '{}'", name);
        self.handle.spawn(task);
    }
}
