// tests/scheduler.rs
//
// Drives the full worker pool through the bootstrap entrypoint: a main cell
// launches a batch of counter cells, feeds each a numbered message stream,
// and every cell closes itself when its stream is done.

use apiary::{encode, start, ApiaryError, Behavior, BehaviorFactory, CellEnv, RuntimeOptions, Value};
use std::sync::{Arc, Mutex};

mod common;

#[derive(Default)]
struct CounterLog {
  seqs: Mutex<Vec<i32>>,
}

struct Counter {
  log: Arc<CounterLog>,
  limit: i32,
  env: CellEnv,
}

impl Behavior for Counter {
  fn handle(&mut self, _port: i32, payload: Vec<Value>) -> Result<(), ApiaryError> {
    let Value::Int(seq) = &payload[0] else {
      return Err(ApiaryError::Behavior("expected an integer marker".into()));
    };
    let done = {
      let mut seqs = self.log.seqs.lock().unwrap();
      seqs.push(*seq);
      seqs.len() as i32 == self.limit
    };
    if done {
      self.env.self_ref.close();
    }
    Ok(())
  }
}

#[derive(Default)]
struct PoolState {
  counters: Mutex<Vec<Arc<CounterLog>>>,
}

struct PoolFactory {
  state: Arc<PoolState>,
  cells: usize,
  per_cell: i32,
}

impl BehaviorFactory for PoolFactory {
  fn create(&self, source: &str, env: CellEnv) -> Result<Box<dyn Behavior>, ApiaryError> {
    match source {
      "system" => Ok(Box::new(common::Idle)),
      "main" => {
        // Launch the workload, then retire immediately; the pool drains the
        // counters on its own.
        for _ in 0..self.cells {
          let counter = env.context.spawn("counter")?;
          for seq in 0..self.per_cell {
            let payload = encode(&[Value::Int(seq)])?;
            counter.send(1, Some(payload))?;
          }
        }
        env.self_ref.close();
        Ok(Box::new(common::Idle))
      }
      "counter" => {
        let log = Arc::new(CounterLog::default());
        self.state.counters.lock().unwrap().push(log.clone());
        Ok(Box::new(Counter {
          log,
          limit: self.per_cell,
          env,
        }))
      }
      other => Err(ApiaryError::Spawn(format!("unknown source {other}"))),
    }
  }
}

#[test]
fn pool_delivers_every_stream_in_order() {
  common::init_tracing();
  const CELLS: usize = 8;
  const PER_CELL: i32 = 50;

  let state = Arc::new(PoolState::default());
  let factory = Arc::new(PoolFactory {
    state: state.clone(),
    cells: CELLS,
    per_cell: PER_CELL,
  });

  start(
    RuntimeOptions::new().with_worker_threads(4),
    factory,
    "system",
    "main",
  )
  .expect("runtime");

  let counters = state.counters.lock().unwrap();
  assert_eq!(counters.len(), CELLS);
  for (i, log) in counters.iter().enumerate() {
    let seqs = log.seqs.lock().unwrap();
    assert_eq!(
      *seqs,
      (0..PER_CELL).collect::<Vec<i32>>(),
      "counter {i} received its stream out of order"
    );
  }
}
