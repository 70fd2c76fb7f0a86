// src/runtime/worker.rs

//! The worker loop: pop a ready cell, deliver one message, requeue.

use crate::cell::{CellId, DispatchOutcome};
use crate::context::Context;

use std::time::Duration;

/// How long a worker sleeps after a pass with nothing to deliver.
pub(crate) const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Serves the ready queue until only the system cell remains registered.
///
/// One visit delivers at most one message, so no cell can starve the others
/// on this thread; a cell that terminates is dropped from circulation and
/// the registered total goes down. The exit condition is a plain
/// termination-detection policy, not a quiescence handshake: once the total
/// is ≤ 1 after an idle pause, the worker leaves.
pub(crate) fn worker_loop(ctx: &Context) {
  tracing::debug!("worker started");
  let mut idle_visits: usize = 0;
  loop {
    let popped = ctx.ready().pop();
    let mut delivered = false;
    if let Some(id) = popped {
      // A stale id (cell destroyed since it was queued) is skipped.
      if let Some(cell) = ctx.lookup(id) {
        match ctx.dispatch_arc(&cell) {
          DispatchOutcome::Terminated => {
            // Out of circulation; the total was decremented by dispatch.
            delivered = true;
          }
          DispatchOutcome::Delivered => {
            delivered = true;
            requeue(ctx, id);
          }
          DispatchOutcome::Empty => {
            requeue(ctx, id);
          }
        }
      }
    }
    if delivered {
      idle_visits = 0;
    } else {
      idle_visits += 1;
    }

    // The equivalent of a full fruitless sweep over the registered set: an
    // empty queue, or as many consecutive no-delivery visits as there are
    // cells.
    if popped.is_none() || idle_visits > ctx.registered_cells() {
      std::thread::sleep(IDLE_SLEEP);
      idle_visits = 0;
      if ctx.registered_cells() <= 1 {
        break;
      }
    }
  }
  tracing::debug!("worker exiting; at most the system cell remains");
}

fn requeue(ctx: &Context, id: CellId) {
  // Cannot overflow while the spawn-time saturation cap holds.
  if let Err(e) = ctx.ready().push(id) {
    tracing::error!(?id, error = %e, "failed to requeue cell");
  }
}
