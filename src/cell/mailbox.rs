use crate::message::Message;
use std::collections::VecDeque;

/// A cell's private message buffer: multi-producer (any thread holding the
/// cell lock may append) / single-consumer (the worker currently dispatching
/// the cell). FIFO in send order; doubles capacity in place on overflow.
///
/// All access happens under the owning cell's lock, so the type itself is
/// plain sequential code.
pub(crate) struct Mailbox {
  queue: VecDeque<Message>,
}

impl Mailbox {
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      queue: VecDeque::with_capacity(capacity.max(1)),
    }
  }

  pub fn push(&mut self, msg: Message) {
    self.queue.push_back(msg);
  }

  pub fn pop(&mut self) -> Option<Message> {
    self.queue.pop_front()
  }

  /// Removes and returns everything currently queued, preserving order.
  /// Used by the closing drain.
  pub fn drain_all(&mut self) -> Vec<Message> {
    self.queue.drain(..).collect()
  }

  pub fn len(&self) -> usize {
    self.queue.len()
  }

  #[allow(dead_code)]
  pub fn capacity(&self) -> usize {
    self.queue.capacity()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn preserves_fifo_order_across_growth() {
    let mut mb = Mailbox::with_capacity(4);
    let initial_cap = mb.capacity();
    for i in 0..200 {
      mb.push(Message::new(i, None));
    }
    assert!(mb.capacity() > initial_cap, "mailbox should have grown");
    for i in 0..200 {
      assert_eq!(mb.pop().unwrap().port(), i);
    }
    assert!(mb.pop().is_none());
  }

  #[test]
  fn drain_preserves_order_and_content() {
    let mut mb = Mailbox::with_capacity(2);
    for i in 0..100 {
      mb.push(Message::new(i, None));
    }
    let drained = mb.drain_all();
    assert_eq!(drained.len(), 100);
    for (i, m) in drained.iter().enumerate() {
      assert_eq!(m.port(), i as i32);
    }
    assert_eq!(mb.len(), 0);
  }
}
