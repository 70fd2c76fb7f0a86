use crate::cell::CellRef;
use crate::context::Context;
use crate::error::ApiaryError;
use crate::message::Value;

/// The per-cell behavior host contract.
///
/// The runtime only needs these two entry points; the concrete executor (an
/// embedded interpreter, a callback table, a test double) is supplied by the
/// embedder through a [`BehaviorFactory`].
pub trait Behavior: Send {
  /// Invoked once per delivered message with the decoded payload values.
  /// Runs synchronously on the dispatching worker thread. Errors (and
  /// panics) are caught at the dispatch boundary and logged; they never
  /// reach the scheduler or other cells.
  fn handle(&mut self, port: i32, payload: Vec<Value>) -> Result<(), ApiaryError>;

  /// Invoked exactly once after the cell's mailbox has drained during close.
  /// The behavior is dropped immediately afterwards.
  fn teardown(&mut self) {}
}

/// Builds behaviors at spawn time from an application-defined source string.
pub trait BehaviorFactory: Send + Sync {
  fn create(&self, source: &str, env: CellEnv) -> Result<Box<dyn Behavior>, ApiaryError>;
}

/// Everything a behavior needs from the runtime, handed over at creation.
///
/// `self_ref` keeps the cell's reference count at one or above for as long
/// as the behavior is attached; it is released when the behavior is dropped
/// after teardown. That ordering is what guarantees the count cannot reach
/// zero while a behavior host is still attached.
pub struct CellEnv {
  pub context: Context,
  pub self_ref: CellRef,
  /// Reference to the distinguished system cell, when one exists. `None`
  /// only for the system cell itself during bootstrap.
  pub system: Option<CellRef>,
}
