use crate::codec::Payload;
use std::fmt;

/// Reserved port: periodic tick injected by the timer thread. No payload.
pub const PORT_TICK: i32 = 0;

/// Reserved port: final teardown delivered once while a cell drains. No
/// payload. Behaviors observe it through `Behavior::teardown`, not as a
/// regular message.
pub const PORT_TEARDOWN: i32 = 5;

/// A single mailbox entry: an application-defined port tag plus an optional
/// owned serialized payload.
pub struct Message {
  port: i32,
  payload: Option<Payload>,
}

impl Message {
  pub fn new(port: i32, payload: Option<Payload>) -> Self {
    Self { port, payload }
  }

  /// Port tag distinguishing tick/teardown/application messages.
  pub fn port(&self) -> i32 {
    self.port
  }

  pub fn has_payload(&self) -> bool {
    self.payload.is_some()
  }

  /// Consumes the message, yielding the port and the payload for decoding.
  pub fn into_parts(self) -> (i32, Option<Payload>) {
    (self.port, self.payload)
  }
}

impl fmt::Debug for Message {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Message")
      .field("port", &self.port)
      .field("payload_len", &self.payload.as_ref().map(|p| p.len()))
      .finish()
  }
}
