/// A trait for handing background work off to an executor.
///
/// Tracking writes are fired as non-blocking background work; the spawner
/// decides where they run.
pub trait TaskSpawner: Send + Sync + 'static {
  /// Runs a type-erased task.
  fn spawn(&self, task: Box<dyn FnOnce() + Send>);
}

/// Spawns each task on a fresh OS thread. The default.
#[derive(Debug, Default)]
pub struct ThreadSpawner;

impl TaskSpawner for ThreadSpawner {
  fn spawn(&self, task: Box<dyn FnOnce() + Send>) {
    std::thread::spawn(task);
  }
}

/// Runs each task on the calling thread before returning.
///
/// Makes background tracking deterministic; useful in tests and in callers
/// that prefer paying the write cost inline.
#[derive(Debug, Default)]
pub struct InlineSpawner;

impl TaskSpawner for InlineSpawner {
  fn spawn(&self, task: Box<dyn FnOnce() + Send>) {
    task();
  }
}

#[cfg(feature = "tokio")]
pub struct TokioSpawner(tokio::runtime::Handle);

#[cfg(feature = "tokio")]
impl TokioSpawner {
  /// Creates a spawner that uses the current Tokio runtime context.
  /// Panics if called outside of a Tokio runtime.
  pub fn new() -> Self {
    Self(tokio::runtime::Handle::current())
  }
}

#[cfg(feature = "tokio")]
impl TaskSpawner for TokioSpawner {
  fn spawn(&self, task: Box<dyn FnOnce() + Send>) {
    self.0.spawn_blocking(task);
  }
}
