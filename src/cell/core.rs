// src/cell/core.rs

//! The cell itself: lifecycle flags, reference counting, and single-message
//! dispatch.

use crate::cell::behavior::Behavior;
use crate::cell::handle::CellId;
use crate::cell::mailbox::Mailbox;
use crate::context::Context;
use crate::error::ApiaryError;
use crate::message::Message;

use bitflags::bitflags;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};

bitflags! {
  /// Lifecycle flags guarded by the cell lock.
  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  pub(crate) struct CellFlags: u8 {
    /// Close requested: new sends are rejected, the mailbox drains on the
    /// next scheduler visit.
    const CLOSING  = 0b01;
    /// The behavior host has been taken for teardown. Set at most once.
    const DETACHED = 0b10;
  }
}

/// Result of one scheduler visit to a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
  /// No message was pending.
  Empty,
  /// Exactly one message was delivered to the behavior.
  Delivered,
  /// The cell finished its lifecycle during this visit. It must not be
  /// requeued; the registered-cell total goes down by one.
  Terminated,
}

/// State guarded by the cell lock: the mailbox plus lifecycle flags.
struct CellState {
  mailbox: Mailbox,
  flags: CellFlags,
}

/// One actor.
///
/// The behavior slot lives behind its own lock, separate from the mailbox
/// lock: dispatch holds the behavior exclusively for the duration of a
/// handler call (the scheduler guarantees a cell is visited by one worker at
/// a time), while sends from inside that handler only touch the state lock.
pub(crate) struct Cell {
  id: CellId,
  state: Mutex<CellState>,
  behavior: Mutex<Option<Box<dyn Behavior>>>,
  /// Logical reference count: handles, encoded references, behavior envs.
  refs: AtomicIsize,
  /// Set once the reference count has reached zero.
  quitting: AtomicBool,
}

impl Cell {
  pub(crate) fn new(id: CellId, mailbox_capacity: usize) -> Self {
    Self {
      id,
      state: Mutex::new(CellState {
        mailbox: Mailbox::with_capacity(mailbox_capacity),
        flags: CellFlags::empty(),
      }),
      behavior: Mutex::new(None),
      refs: AtomicIsize::new(0),
      quitting: AtomicBool::new(false),
    }
  }

  pub(crate) fn id(&self) -> CellId {
    self.id
  }

  pub(crate) fn grab(&self) {
    self.refs.fetch_add(1, Ordering::Relaxed);
  }

  /// Drops one reference. Returns true when this call took the count to
  /// zero, which also flags the cell as quitting.
  pub(crate) fn release(&self) -> bool {
    let old = self.refs.fetch_sub(1, Ordering::AcqRel);
    debug_assert!(old > 0, "cell reference count underflow");
    if old == 1 {
      self.quitting.store(true, Ordering::Release);
      true
    } else {
      false
    }
  }

  #[allow(dead_code)]
  pub(crate) fn ref_count(&self) -> isize {
    self.refs.load(Ordering::Acquire)
  }

  pub(crate) fn is_detached(&self) -> bool {
    self.state.lock().flags.contains(CellFlags::DETACHED)
  }

  pub(crate) fn attach_behavior(&self, behavior: Box<dyn Behavior>) {
    let mut slot = self.behavior.lock();
    debug_assert!(slot.is_none(), "behavior attached twice");
    *slot = Some(behavior);
  }

  /// Takes the behavior back out without running teardown. Only used to
  /// unwind a spawn that failed after attachment.
  pub(crate) fn detach_behavior(&self) -> Option<Box<dyn Behavior>> {
    self.behavior.lock().take()
  }

  /// Appends a message, rejecting closed or quitting targets.
  pub(crate) fn push_message(&self, msg: Message) -> Result<(), ApiaryError> {
    if self.quitting.load(Ordering::Acquire) {
      return Err(ApiaryError::ClosedTarget);
    }
    let mut st = self.state.lock();
    if st.flags.contains(CellFlags::CLOSING) {
      return Err(ApiaryError::ClosedTarget);
    }
    st.mailbox.push(msg);
    Ok(())
  }

  /// Flags the cell as closing. Returns whether this call transitioned it.
  pub(crate) fn close(&self) -> bool {
    let mut st = self.state.lock();
    if st.flags.contains(CellFlags::CLOSING) {
      false
    } else {
      st.flags.insert(CellFlags::CLOSING);
      true
    }
  }

  /// One scheduler visit: processes at most one message, or performs the
  /// closing drain, or destroys a zero-referenced cell.
  pub(crate) fn dispatch_once(&self, ctx: &Context) -> DispatchOutcome {
    if self.quitting.load(Ordering::Acquire) {
      // Zero-referenced. The behavior is normally long gone, because its
      // env holds a self-reference until teardown; observing one here means
      // the embedder dropped the env early. Run the full drain anyway so
      // teardown is never skipped.
      let taken = self.behavior.lock().take();
      if let Some(behavior) = taken {
        let (pending, was_closing) = {
          let mut st = self.state.lock();
          let was_closing = st.flags.contains(CellFlags::CLOSING);
          st.flags.insert(CellFlags::CLOSING | CellFlags::DETACHED);
          (st.mailbox.drain_all(), was_closing)
        };
        if !was_closing {
          tracing::warn!(
            id = ?self.id,
            "cell reached zero references with a behavior still attached; forcing teardown"
          );
        }
        self.run_teardown(ctx, behavior, pending);
      }
      ctx.destroy_cell(self.id);
      return DispatchOutcome::Terminated;
    }

    // Closing drain: detach exactly once, deliver the backlog synchronously,
    // then tear the behavior down. No new messages can arrive once CLOSING
    // is set, so the snapshot is complete.
    let pending = {
      let mut st = self.state.lock();
      if st.flags.contains(CellFlags::CLOSING) && !st.flags.contains(CellFlags::DETACHED) {
        st.flags.insert(CellFlags::DETACHED);
        Some(st.mailbox.drain_all())
      } else {
        None
      }
    };
    if let Some(pending) = pending {
      if let Some(behavior) = self.behavior.lock().take() {
        self.run_teardown(ctx, behavior, pending);
      }
      return DispatchOutcome::Terminated;
    }

    let msg = self.state.lock().mailbox.pop();
    let Some(msg) = msg else {
      return DispatchOutcome::Empty;
    };
    let mut slot = self.behavior.lock();
    match slot.as_mut() {
      Some(behavior) => {
        self.deliver(ctx, behavior.as_mut(), msg);
        DispatchOutcome::Delivered
      }
      // Already detached; the message was drained into the void.
      None => DispatchOutcome::Empty,
    }
  }

  /// Decodes the payload and invokes the behavior, absorbing failures so one
  /// faulty message cannot take down the worker or the cell.
  fn deliver(&self, ctx: &Context, behavior: &mut dyn Behavior, msg: Message) {
    let (port, payload) = msg.into_parts();
    let values = match payload {
      None => Vec::new(),
      Some(p) => match crate::codec::decode(p, ctx) {
        Ok(values) => values,
        Err(e) => {
          tracing::warn!(id = ?self.id, port, error = %e, "dropping message with undecodable payload");
          return;
        }
      },
    };
    match catch_unwind(AssertUnwindSafe(|| behavior.handle(port, values))) {
      Ok(Ok(())) => {}
      Ok(Err(e)) => {
        tracing::warn!(id = ?self.id, port, error = %e, "behavior reported failure");
      }
      Err(_) => {
        tracing::warn!(id = ?self.id, port, "behavior panicked while handling message");
      }
    }
  }

  /// Delivers the drained backlog, then the final teardown. Dropping the
  /// behavior afterwards releases the self-reference held by its env, which
  /// usually takes the count to zero and destroys the slot.
  fn run_teardown(&self, ctx: &Context, mut behavior: Box<dyn Behavior>, pending: Vec<Message>) {
    let backlog = pending.len();
    for msg in pending {
      self.deliver(ctx, behavior.as_mut(), msg);
    }
    if catch_unwind(AssertUnwindSafe(|| behavior.teardown())).is_err() {
      tracing::warn!(id = ?self.id, "behavior panicked during teardown");
    }
    tracing::debug!(id = ?self.id, backlog, "behavior torn down");
  }
}
