// src/runtime/mod.rs

//! The scheduler: ready queue, worker pool, timer thread, and the blocking
//! bootstrap entrypoint.

pub(crate) mod ready_queue;
pub(crate) mod timer;
pub(crate) mod worker;

use crate::cell::{BehaviorFactory, CellRef, DispatchOutcome};
use crate::config::RuntimeOptions;
use crate::context::Context;
use crate::error::ApiaryError;

use std::sync::Arc;
use std::thread;

/// Boots a complete runtime and blocks until every cell has terminated.
///
/// Spawns the system cell from `system_source`, registers it as the
/// distinguished tick target, spawns the main cell from `main_source`, then
/// runs `options.worker_threads` workers plus the timer thread. The pool
/// drains once the main cell (and everything it launched) has terminated;
/// the system cell is then closed and drained on the calling thread, so the
/// registered-cell total is zero when this returns.
pub fn start(
  options: RuntimeOptions,
  factory: Arc<dyn BehaviorFactory>,
  system_source: &str,
  main_source: &str,
) -> Result<(), ApiaryError> {
  let ctx = Context::new(options, factory);

  let system = ctx.spawn(system_source)?;
  ctx.set_system(&system);
  // The handle pins the main cell's reference count above zero for the
  // whole run, so its lifecycle always ends through the close-drain path.
  let main = match ctx.spawn(main_source) {
    Ok(main) => main,
    Err(e) => {
      system.close();
      drain(&ctx, &system);
      return Err(e);
    }
  };

  let workers = ctx.options().worker_threads;
  tracing::info!(workers, "apiary runtime starting");

  let mut handles = Vec::with_capacity(workers + 1);
  {
    let tctx = ctx.clone();
    handles.push(spawn_thread("apiary-timer".into(), move || {
      timer::timer_loop(&tctx)
    })?);
  }
  for i in 0..workers {
    let wctx = ctx.clone();
    handles.push(spawn_thread(format!("apiary-worker-{i}"), move || {
      worker::worker_loop(&wctx)
    })?);
  }
  for handle in handles {
    if handle.join().is_err() {
      tracing::error!("runtime thread panicked");
    }
  }
  drop(main);

  system.close();
  drain(&ctx, &system);
  drop(system);

  tracing::info!(remaining = ctx.registered_cells(), "apiary runtime stopped");
  Ok(())
}

fn spawn_thread(
  name: String,
  body: impl FnOnce() + Send + 'static,
) -> Result<thread::JoinHandle<()>, ApiaryError> {
  thread::Builder::new()
    .name(name)
    .spawn(body)
    .map_err(|e| ApiaryError::Internal(format!("failed to spawn runtime thread: {e}")))
}

/// Drives one cell on the current thread until it terminates. No worker may
/// be visiting the cell concurrently.
fn drain(ctx: &Context, cell: &CellRef) {
  loop {
    match ctx.dispatch_cell(cell) {
      DispatchOutcome::Terminated => break,
      // Already torn down by a worker before the pool drained.
      DispatchOutcome::Empty if cell.cell().is_detached() => break,
      _ => {}
    }
  }
}
