// src/runtime/ready_queue.rs

//! The global ready queue: a fixed-capacity, lock-free ring of cell ids.
//!
//! Multi-producer / multi-consumer. A push reserves a slot with a fetch-add
//! on the tail, stores the id, then publishes it with a release store on the
//! slot's flag, so a consumer can never observe a half-written slot. A pop
//! requires the head slot to be published and claims it with a CAS on the
//! head; on contention it simply reports "nothing available" instead of
//! blocking.
//!
//! Capacity is a hard ceiling on simultaneously scheduled cells, not a soft
//! backpressure signal: a cell occupies at most one slot (it is out of the
//! ring while a worker processes it), spawning refuses to register more
//! cells than slots, and an overflowing push is an error rather than a
//! silent clamp.

use crate::cell::CellId;
use crate::error::ApiaryError;

use static_assertions::const_assert;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Hard ceiling on simultaneously scheduled cells.
pub(crate) const READY_QUEUE_CAPACITY: usize = 0x10000;

const_assert!(READY_QUEUE_CAPACITY.is_power_of_two());

const MASK: u64 = READY_QUEUE_CAPACITY as u64 - 1;

struct Slot {
  id: AtomicU64,
  published: AtomicBool,
}

pub(crate) struct ReadyQueue {
  /// Monotonically increasing pop position; the slot index is `head & MASK`.
  head: AtomicU64,
  /// Monotonically increasing push position.
  tail: AtomicU64,
  slots: Box<[Slot]>,
}

impl ReadyQueue {
  pub fn new() -> Self {
    let slots = (0..READY_QUEUE_CAPACITY)
      .map(|_| Slot {
        id: AtomicU64::new(0),
        published: AtomicBool::new(false),
      })
      .collect::<Vec<_>>()
      .into_boxed_slice();
    Self {
      head: AtomicU64::new(0),
      tail: AtomicU64::new(0),
      slots,
    }
  }

  /// Makes `id` eligible for one scheduling visit.
  pub fn push(&self, id: CellId) -> Result<(), ApiaryError> {
    let head = self.head.load(Ordering::Acquire);
    let tail = self.tail.load(Ordering::Relaxed);
    if tail.wrapping_sub(head) >= READY_QUEUE_CAPACITY as u64 {
      return Err(ApiaryError::Internal("ready queue overflow".into()));
    }
    let reserved = self.tail.fetch_add(1, Ordering::AcqRel);
    let slot = &self.slots[(reserved & MASK) as usize];
    slot.id.store(id.to_raw(), Ordering::Relaxed);
    slot.published.store(true, Ordering::Release);
    Ok(())
  }

  /// Claims the next ready cell, or returns `None` if the queue looks empty,
  /// the head slot is not yet published, or another consumer won the head.
  /// Never blocks; callers retry or go idle.
  pub fn pop(&self) -> Option<CellId> {
    let head = self.head.load(Ordering::Acquire);
    if head == self.tail.load(Ordering::Acquire) {
      return None;
    }
    let slot = &self.slots[(head & MASK) as usize];
    if !slot.published.load(Ordering::Acquire) {
      return None;
    }
    let raw = slot.id.load(Ordering::Relaxed);
    if self
      .head
      .compare_exchange(head, head + 1, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return None;
    }
    slot.published.store(false, Ordering::Release);
    Some(CellId::from_raw(raw))
  }

  /// Approximate occupancy; exact only when producers and consumers are
  /// quiet.
  #[allow(dead_code)]
  pub fn len(&self) -> usize {
    let head = self.head.load(Ordering::Acquire);
    let tail = self.tail.load(Ordering::Acquire);
    tail.wrapping_sub(head) as usize
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;
  use std::sync::atomic::AtomicUsize;
  use std::sync::{Arc, Mutex};
  use std::thread;

  #[test]
  fn fifo_when_uncontended() {
    let q = ReadyQueue::new();
    for i in 0..100u32 {
      q.push(CellId::new(i, 0)).unwrap();
    }
    for i in 0..100u32 {
      assert_eq!(q.pop(), Some(CellId::new(i, 0)));
    }
    assert_eq!(q.pop(), None);
  }

  #[test]
  fn every_push_is_popped_exactly_once_under_contention() {
    const PUSHERS: u32 = 4;
    const POPPERS: usize = 4;
    const PER_PUSHER: u32 = 5_000;

    let q = Arc::new(ReadyQueue::new());
    let popped = Arc::new(Mutex::new(Vec::new()));
    let done = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for p in 0..PUSHERS {
      let q = q.clone();
      let done = done.clone();
      handles.push(thread::spawn(move || {
        for i in 0..PER_PUSHER {
          q.push(CellId::new(i, p)).unwrap();
        }
        done.fetch_add(1, Ordering::SeqCst);
      }));
    }
    for _ in 0..POPPERS {
      let q = q.clone();
      let done = done.clone();
      let popped = popped.clone();
      handles.push(thread::spawn(move || {
        let mut local = Vec::new();
        loop {
          match q.pop() {
            Some(id) => local.push(id),
            None => {
              // Leave only once the producers are done and nothing is left
              // in flight; a contended pop returns None spuriously.
              if done.load(Ordering::SeqCst) == PUSHERS as usize && q.len() == 0 {
                break;
              }
              thread::yield_now();
            }
          }
        }
        popped.lock().unwrap().extend(local);
      }));
    }
    for h in handles {
      h.join().unwrap();
    }

    let popped = popped.lock().unwrap();
    assert_eq!(popped.len(), (PUSHERS * PER_PUSHER) as usize, "no loss");
    let unique: HashSet<_> = popped.iter().copied().collect();
    assert_eq!(unique.len(), popped.len(), "no duplication");
  }

  #[test]
  fn overflow_is_an_explicit_error() {
    let q = ReadyQueue::new();
    for i in 0..READY_QUEUE_CAPACITY as u32 {
      q.push(CellId::new(i, 0)).unwrap();
    }
    assert!(q.push(CellId::new(0, 1)).is_err());
    // Popping one frees one slot.
    assert!(q.pop().is_some());
    assert!(q.push(CellId::new(0, 1)).is_ok());
  }
}
