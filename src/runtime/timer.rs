// src/runtime/timer.rs

//! The timer thread: injects catch-up tick messages into the system cell.

use crate::context::Context;
use crate::message::PORT_TICK;

use std::time::{Duration, Instant};

/// Tick granularity.
pub(crate) const TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Pause between clock samples; a quarter tick, so scheduling delays are
/// caught up in batches rather than drifting.
pub(crate) const SAMPLE_SLEEP: Duration = Duration::from_micros(2500);

/// Clock-independent tick arithmetic: converts a monotonically growing
/// elapsed duration into the number of whole ticks since the previous
/// sample.
pub(crate) struct TickSource {
  last_tick: u64,
}

impl TickSource {
  pub fn new() -> Self {
    Self { last_tick: 0 }
  }

  /// Number of whole ticks between the previous sample and `elapsed`.
  /// Late samples yield the full catch-up batch.
  pub fn advance(&mut self, elapsed: Duration) -> u64 {
    let now_tick = elapsed.as_millis() as u64 / TICK_INTERVAL.as_millis() as u64;
    let ticks = now_tick.saturating_sub(self.last_tick);
    self.last_tick = now_tick;
    ticks
  }
}

/// Samples the monotonic clock and sends one tick message (port 0, no
/// payload) per elapsed tick to the system cell, until only the system cell
/// remains registered.
pub(crate) fn timer_loop(ctx: &Context) {
  tracing::debug!("timer started");
  let baseline = Instant::now();
  let mut source = TickSource::new();
  loop {
    let ticks = source.advance(baseline.elapsed());
    if ticks > 0 {
      if let Some(system) = ctx.system_ref() {
        for _ in 0..ticks {
          if system.send(PORT_TICK, None).is_err() {
            // System cell is closing; ticks no longer matter.
            break;
          }
        }
      }
    }
    std::thread::sleep(SAMPLE_SLEEP);
    if ctx.registered_cells() <= 1 {
      break;
    }
  }
  tracing::debug!("timer exiting");
}
