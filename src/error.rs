use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum ApiaryError {
  // --- Codec Errors ---
  /// The serialized stream is malformed, truncated, or exceeds the maximum
  /// container nesting depth. Local to one message; partially consumed
  /// buffers and partially decoded values are released before this returns.
  #[error("invalid serialized stream: {0}")]
  Protocol(String),

  /// A decoded cell reference does not resolve to a live cell. The slot was
  /// reused (generation mismatch) or the cell was already destroyed.
  #[error("stale cell reference: {0}")]
  StaleReference(String),

  // --- Lifecycle Errors ---
  /// Send to a cell that is already closing or quitting.
  #[error("target cell is closed")]
  ClosedTarget,

  /// The behavior host failed to initialize; the partially constructed cell
  /// was torn down before this was returned.
  #[error("cell spawn failed: {0}")]
  Spawn(String),

  /// Failure reported by a behavior while handling a delivered message.
  /// Caught at the dispatch boundary and logged, never propagated to the
  /// scheduler.
  #[error("behavior failure: {0}")]
  Behavior(String),

  // --- Resource Limits ---
  /// The registered-cell count reached the ready-queue capacity. The
  /// capacity is a hard ceiling on simultaneously scheduled cells.
  #[error("scheduler is saturated ({0} cells registered)")]
  SchedulerSaturated(usize),

  // --- Internal Errors ---
  #[error("internal runtime error: {0}")]
  Internal(String),
}

impl ApiaryError {
  /// Shorthand for a `Protocol` error from a static description.
  pub(crate) fn protocol(msg: impl Into<String>) -> Self {
    ApiaryError::Protocol(msg.into())
  }
}
