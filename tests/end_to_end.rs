// tests/end_to_end.rs

use apiary::{
  encode, start, ApiaryError, Behavior, BehaviorFactory, Blob, CellEnv, DispatchOutcome,
  RuntimeOptions, Value, PORT_TICK,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{Recorder, Recording};

#[test]
fn echo_cell_full_lifecycle() {
  let ctx = common::test_context();
  let log = Arc::new(Recording::default());
  let sys = ctx
    .spawn_with(|_env| {
      Ok(Box::new(Recorder { log: log.clone() }))
    })
    .expect("spawn");
  assert_eq!(ctx.registered_cells(), 1);

  let payload = encode(&[Value::str("hello")]).unwrap();
  sys.send(42, Some(payload)).unwrap();

  // Exactly one delivery with the expected port and payload.
  assert_eq!(ctx.dispatch_cell(&sys), DispatchOutcome::Delivered);
  assert_eq!(ctx.dispatch_cell(&sys), DispatchOutcome::Empty);
  {
    let deliveries = log.deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0, 42);
    assert_eq!(deliveries[0].1, vec![Value::Str(Blob::from("hello"))]);
  }
  assert_eq!(log.teardown_count(), 0);

  // The next drain after close delivers exactly one teardown.
  assert!(sys.close());
  assert_eq!(ctx.dispatch_cell(&sys), DispatchOutcome::Terminated);
  assert_eq!(log.teardown_count(), 1);
  assert_eq!(log.delivery_count(), 1);

  // Reclaimed: the registered total is back to zero and the handle is dead.
  assert_eq!(ctx.registered_cells(), 0);
  assert!(matches!(sys.send(1, None), Err(ApiaryError::ClosedTarget)));
}

struct TickTally {
  ticks: Arc<AtomicU64>,
}

impl Behavior for TickTally {
  fn handle(&mut self, port: i32, _payload: Vec<Value>) -> Result<(), ApiaryError> {
    if port == PORT_TICK {
      self.ticks.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
  }
}

struct Sleeper {
  env: CellEnv,
}

impl Behavior for Sleeper {
  fn handle(&mut self, _port: i32, _payload: Vec<Value>) -> Result<(), ApiaryError> {
    // Keep the runtime busy long enough for several timer ticks to land.
    std::thread::sleep(Duration::from_millis(60));
    self.env.self_ref.close();
    Ok(())
  }
}

struct TimerFactory {
  ticks: Arc<AtomicU64>,
}

impl BehaviorFactory for TimerFactory {
  fn create(&self, source: &str, env: CellEnv) -> Result<Box<dyn Behavior>, ApiaryError> {
    match source {
      "system" => Ok(Box::new(TickTally {
        ticks: self.ticks.clone(),
      })),
      "main" => {
        env.self_ref.send(1, None)?;
        Ok(Box::new(Sleeper { env }))
      }
      other => Err(ApiaryError::Spawn(format!("unknown source {other}"))),
    }
  }
}

#[test]
fn started_runtime_feeds_ticks_to_the_system_cell() {
  common::init_tracing();
  let ticks = Arc::new(AtomicU64::new(0));
  let factory = Arc::new(TimerFactory {
    ticks: ticks.clone(),
  });

  start(RuntimeOptions::default(), factory, "system", "main").expect("runtime");

  // The main cell stayed alive for several tick intervals, so the system
  // cell must have seen catch-up ticks before the runtime wound down.
  assert!(ticks.load(Ordering::Relaxed) >= 1);
}

struct RefusingFactory;

impl BehaviorFactory for RefusingFactory {
  fn create(&self, source: &str, _env: CellEnv) -> Result<Box<dyn Behavior>, ApiaryError> {
    match source {
      "system" => Ok(Box::new(common::Idle)),
      other => Err(ApiaryError::Spawn(format!("refusing {other}"))),
    }
  }
}

#[test]
fn start_propagates_a_main_spawn_failure() {
  common::init_tracing();
  let result = start(
    RuntimeOptions::default(),
    Arc::new(RefusingFactory),
    "system",
    "main",
  );
  assert!(matches!(result, Err(ApiaryError::Spawn(_))));
}
