use crate::cell::{Behavior, BehaviorFactory, Cell, CellEnv, CellId, CellRef, DispatchOutcome};
use crate::config::RuntimeOptions;
use crate::error::ApiaryError;
use crate::runtime::ready_queue::{ReadyQueue, READY_QUEUE_CAPACITY};

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One arena slot. The generation counter is bumped on every free, so a
/// `CellId` minted for a previous occupant can never resolve to the next one.
struct Slot {
  generation: u32,
  cell: Option<Arc<Cell>>,
}

/// Arena of live cells, indexed by the low half of a `CellId`.
struct CellTable {
  slots: RwLock<Vec<Slot>>,
  free: Mutex<Vec<u32>>,
}

impl CellTable {
  fn new() -> Self {
    Self {
      slots: RwLock::new(Vec::new()),
      free: Mutex::new(Vec::new()),
    }
  }

  /// Claims a slot and returns its (index, generation) pair. The slot stays
  /// empty until `attach`.
  fn reserve(&self) -> (u32, u32) {
    let reused = self.free.lock().pop();
    if let Some(index) = reused {
      let slots = self.slots.read();
      return (index, slots[index as usize].generation);
    }
    let mut slots = self.slots.write();
    let index = slots.len() as u32;
    slots.push(Slot {
      generation: 0,
      cell: None,
    });
    (index, 0)
  }

  fn attach(&self, id: CellId, cell: Arc<Cell>) {
    let mut slots = self.slots.write();
    let slot = &mut slots[id.index() as usize];
    debug_assert_eq!(slot.generation, id.generation());
    debug_assert!(slot.cell.is_none());
    slot.cell = Some(cell);
  }

  fn lookup(&self, id: CellId) -> Option<Arc<Cell>> {
    let slots = self.slots.read();
    let slot = slots.get(id.index() as usize)?;
    if slot.generation != id.generation() {
      return None;
    }
    slot.cell.clone()
  }

  /// Empties the slot and retires its generation. Returns the evicted cell,
  /// or `None` if the id was already stale (destruction is exactly-once).
  fn remove(&self, id: CellId) -> Option<Arc<Cell>> {
    let evicted = {
      let mut slots = self.slots.write();
      let slot = slots.get_mut(id.index() as usize)?;
      if slot.generation != id.generation() || slot.cell.is_none() {
        return None;
      }
      slot.generation = slot.generation.wrapping_add(1);
      slot.cell.take()
    };
    self.free.lock().push(id.index());
    evicted
  }
}

/// Shared state behind every `Context` handle.
pub(crate) struct ContextInner {
  table: CellTable,
  ready: ReadyQueue,
  /// Number of registered (spawned, not yet terminated) cells. Workers and
  /// the timer exit once this drops to one.
  total: AtomicUsize,
  options: RuntimeOptions,
  factory: Arc<dyn BehaviorFactory>,
  /// Identity of the distinguished system cell, once bootstrap names one.
  system: RwLock<Option<CellId>>,
}

/// A handle to an apiary runtime context. Cloneable (`Arc`-based); all
/// clones share the cell table, the ready queue, and the worker exit state.
#[derive(Clone)]
pub struct Context {
  inner: Arc<ContextInner>,
}

impl Context {
  pub fn new(options: RuntimeOptions, factory: Arc<dyn BehaviorFactory>) -> Self {
    let options = options.sanitized();
    tracing::debug!(
      workers = options.worker_threads,
      mailbox = options.initial_mailbox_capacity,
      "creating apiary context"
    );
    Self {
      inner: Arc::new(ContextInner {
        table: CellTable::new(),
        ready: ReadyQueue::new(),
        total: AtomicUsize::new(0),
        options,
        factory,
        system: RwLock::new(None),
      }),
    }
  }

  /// Spawns a cell whose behavior is built by the context's factory from an
  /// application-defined source string.
  pub fn spawn(&self, source: &str) -> Result<CellRef, ApiaryError> {
    let factory = self.inner.factory.clone();
    self.spawn_with(move |env| factory.create(source, env))
  }

  /// Spawns a cell from an explicit behavior constructor. This is the
  /// primitive `spawn` is built on; it is public so embedders and tests can
  /// attach behaviors without routing through a factory.
  ///
  /// On constructor failure the partially built cell is torn down and
  /// [`ApiaryError::Spawn`] is returned.
  pub fn spawn_with<F>(&self, build: F) -> Result<CellRef, ApiaryError>
  where
    F: FnOnce(CellEnv) -> Result<Box<dyn Behavior>, ApiaryError>,
  {
    let registered = self.inner.total.load(Ordering::Acquire);
    // One queue slot per registered cell; keep a margin so concurrent
    // spawns cannot race the ring past its capacity.
    if registered + 1 >= READY_QUEUE_CAPACITY {
      return Err(ApiaryError::SchedulerSaturated(registered));
    }

    let (index, generation) = self.inner.table.reserve();
    let id = CellId::new(index, generation);
    let cell = Arc::new(Cell::new(id, self.inner.options.initial_mailbox_capacity));
    self.inner.table.attach(id, cell.clone());

    let env = CellEnv {
      context: self.clone(),
      self_ref: self.make_ref(&cell),
      system: self.system_ref(),
    };
    let behavior = match build(env) {
      Ok(behavior) => behavior,
      Err(e) => {
        // The failed constructor has already dropped the env and its
        // self-reference; evicting the slot reclaims the rest.
        self.inner.table.remove(id);
        tracing::debug!(?id, error = %e, "spawn failed; cell torn down");
        return Err(match e {
          spawn @ ApiaryError::Spawn(_) => spawn,
          other => ApiaryError::Spawn(other.to_string()),
        });
      }
    };

    cell.attach_behavior(behavior);
    self.inner.total.fetch_add(1, Ordering::AcqRel);
    let handle = self.make_ref(&cell);
    if let Err(e) = self.inner.ready.push(id) {
      // Unreachable while the saturation check above holds.
      self.inner.total.fetch_sub(1, Ordering::AcqRel);
      drop(cell.detach_behavior());
      self.inner.table.remove(id);
      return Err(e);
    }
    tracing::debug!(?id, total = self.registered_cells(), "cell spawned");
    Ok(handle)
  }

  /// Number of spawned, not yet terminated cells.
  pub fn registered_cells(&self) -> usize {
    self.inner.total.load(Ordering::Acquire)
  }

  /// A fresh counted reference to the system cell, if one is registered and
  /// still alive.
  pub fn system_ref(&self) -> Option<CellRef> {
    let id = (*self.inner.system.read())?;
    self.lookup_ref(id)
  }

  /// Names the distinguished system cell. Called once during bootstrap.
  pub fn set_system(&self, target: &CellRef) {
    *self.inner.system.write() = Some(target.id());
  }

  /// Performs one scheduler visit on `target`: delivers at most one message,
  /// or runs the closing drain, and returns the outcome. `Terminated`
  /// decrements the registered-cell total.
  ///
  /// Intended for deterministic embedding and tests. Must not be called on a
  /// cell that a running worker pool may visit concurrently, and not from
  /// inside a behavior handler.
  pub fn dispatch_cell(&self, target: &CellRef) -> DispatchOutcome {
    self.dispatch_arc(target.cell())
  }

  pub(crate) fn dispatch_arc(&self, cell: &Arc<Cell>) -> DispatchOutcome {
    let outcome = cell.dispatch_once(self);
    if outcome == DispatchOutcome::Terminated {
      let prev = self.inner.total.fetch_sub(1, Ordering::AcqRel);
      debug_assert!(prev > 0, "terminated more cells than were registered");
      tracing::trace!(id = ?cell.id(), remaining = prev - 1, "cell terminated");
    }
    outcome
  }

  pub(crate) fn lookup(&self, id: CellId) -> Option<Arc<Cell>> {
    self.inner.table.lookup(id)
  }

  /// Resolves an id to a fresh counted reference, as the codec does for
  /// decoded cell values.
  pub(crate) fn lookup_ref(&self, id: CellId) -> Option<CellRef> {
    self.lookup(id).map(|cell| self.make_ref(&cell))
  }

  pub(crate) fn make_ref(&self, cell: &Arc<Cell>) -> CellRef {
    CellRef::grabbed(cell.clone(), self.clone())
  }

  /// Evicts the cell's slot. Exactly-once: stale ids are ignored.
  pub(crate) fn destroy_cell(&self, id: CellId) {
    if self.inner.table.remove(id).is_some() {
      tracing::trace!(?id, "cell destroyed");
    }
  }

  /// Called by the reference that took a cell's count to zero. A terminated
  /// cell is no longer requeued, so this release is the last chance to
  /// reclaim its slot; a still-running cell is left for the scheduler, which
  /// observes `quitting` on its next visit.
  pub(crate) fn on_cell_zero(&self, cell: &Arc<Cell>) {
    if cell.is_detached() {
      self.destroy_cell(cell.id());
    }
  }

  pub(crate) fn ready(&self) -> &ReadyQueue {
    &self.inner.ready
  }

  pub(crate) fn options(&self) -> &RuntimeOptions {
    &self.inner.options
  }
}

impl fmt::Debug for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Context")
      .field("registered_cells", &self.registered_cells())
      .finish_non_exhaustive()
  }
}
