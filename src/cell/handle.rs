use crate::cell::core::Cell;
use crate::codec::Payload;
use crate::context::Context;
use crate::error::ApiaryError;
use crate::message::Message;

use std::fmt;
use std::sync::Arc;

/// Stable identity of a cell: a 32-bit table index tagged with a 32-bit slot
/// generation. The generation changes every time a slot is reused, so a
/// handle to a destroyed cell can never alias its successor.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(u64);

impl CellId {
  pub(crate) fn new(index: u32, generation: u32) -> Self {
    Self(((generation as u64) << 32) | index as u64)
  }

  pub(crate) fn index(self) -> u32 {
    self.0 as u32
  }

  pub(crate) fn generation(self) -> u32 {
    (self.0 >> 32) as u32
  }

  /// Raw wire form, as embedded by the codec.
  pub(crate) fn to_raw(self) -> u64 {
    self.0
  }

  pub(crate) fn from_raw(raw: u64) -> Self {
    Self(raw)
  }
}

impl fmt::Debug for CellId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "cell-{}v{}", self.index(), self.generation())
  }
}

/// A counted reference to a cell.
///
/// Cloning increments the target's logical reference count; dropping
/// decrements it. When the count reaches zero the cell is flagged as
/// quitting and, once its behavior has been torn down, destroyed.
/// This is the proxy object a decoded cell reference resolves to.
pub struct CellRef {
  cell: Arc<Cell>,
  ctx: Context,
}

impl CellRef {
  /// Takes a fresh reference on `cell`.
  pub(crate) fn grabbed(cell: Arc<Cell>, ctx: Context) -> Self {
    cell.grab();
    Self { cell, ctx }
  }

  pub fn id(&self) -> CellId {
    self.cell.id()
  }

  pub(crate) fn cell(&self) -> &Arc<Cell> {
    &self.cell
  }

  /// Appends a message to the target's mailbox.
  ///
  /// Fails with [`ApiaryError::ClosedTarget`] if the target is closing or
  /// quitting. The payload is consumed either way; a rejected payload is
  /// dropped here, which releases any cell references it was carrying.
  pub fn send(&self, port: i32, payload: Option<Payload>) -> Result<(), ApiaryError> {
    self.cell.push_message(Message::new(port, payload))
  }

  /// Requests a cooperative close: no new sends are accepted, queued
  /// messages drain on the next scheduler visit, then the behavior is torn
  /// down. Idempotent; returns whether this call performed the transition.
  /// An in-flight dispatch is never interrupted.
  pub fn close(&self) -> bool {
    let transitioned = self.cell.close();
    if transitioned {
      tracing::debug!(id = ?self.id(), "cell close requested");
    }
    transitioned
  }
}

impl Clone for CellRef {
  fn clone(&self) -> Self {
    self.cell.grab();
    Self {
      cell: self.cell.clone(),
      ctx: self.ctx.clone(),
    }
  }
}

impl Drop for CellRef {
  fn drop(&mut self) {
    if self.cell.release() {
      self.ctx.on_cell_zero(&self.cell);
    }
  }
}

impl PartialEq for CellRef {
  fn eq(&self, other: &Self) -> bool {
    self.id() == other.id()
  }
}

impl Eq for CellRef {}

impl fmt::Debug for CellRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{:?}]", self.id())
  }
}
