//! Explicit runtime configuration.
//!
//! All tunables are threaded through constructors; there is no ambient
//! per-context registry.

/// Default number of OS worker threads serving the ready queue.
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Default initial capacity of a cell's mailbox. The mailbox doubles in
/// place when it fills, so this only sets the pre-growth footprint.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Configuration for a runtime [`Context`](crate::Context).
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
  /// Number of worker threads in the dispatch pool. Clamped to at least 1.
  pub worker_threads: usize,
  /// Initial per-cell mailbox capacity. Clamped to at least 1.
  pub initial_mailbox_capacity: usize,
}

impl Default for RuntimeOptions {
  fn default() -> Self {
    Self {
      worker_threads: DEFAULT_WORKER_THREADS,
      initial_mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
    }
  }
}

impl RuntimeOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_worker_threads(mut self, threads: usize) -> Self {
    self.worker_threads = threads;
    self
  }

  pub fn with_initial_mailbox_capacity(mut self, capacity: usize) -> Self {
    self.initial_mailbox_capacity = capacity;
    self
  }

  /// Returns a copy with all fields clamped to usable minimums.
  pub(crate) fn sanitized(&self) -> Self {
    Self {
      worker_threads: self.worker_threads.max(1),
      initial_mailbox_capacity: self.initial_mailbox_capacity.max(1),
    }
  }
}
