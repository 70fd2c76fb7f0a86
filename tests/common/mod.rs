// tests/common/mod.rs

#![allow(dead_code)]

use apiary::{ApiaryError, Behavior, BehaviorFactory, CellEnv, Context, RuntimeOptions, Value};
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};

static TRACING: Lazy<()> = Lazy::new(|| {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
});

pub fn init_tracing() {
  Lazy::force(&TRACING);
}

/// A behavior that ignores everything it receives.
pub struct Idle;

impl Behavior for Idle {
  fn handle(&mut self, _port: i32, _payload: Vec<Value>) -> Result<(), ApiaryError> {
    Ok(())
  }
}

pub struct IdleFactory;

impl BehaviorFactory for IdleFactory {
  fn create(&self, _source: &str, _env: CellEnv) -> Result<Box<dyn Behavior>, ApiaryError> {
    Ok(Box::new(Idle))
  }
}

/// A context with default options and a factory that builds idle behaviors
/// for any source.
pub fn test_context() -> Context {
  init_tracing();
  Context::new(RuntimeOptions::default(), Arc::new(IdleFactory))
}

/// Shared log written by a `Recorder` behavior.
#[derive(Default)]
pub struct Recording {
  pub deliveries: Mutex<Vec<(i32, Vec<Value>)>>,
  pub teardowns: Mutex<u32>,
}

impl Recording {
  pub fn delivery_count(&self) -> usize {
    self.deliveries.lock().unwrap().len()
  }

  pub fn teardown_count(&self) -> u32 {
    *self.teardowns.lock().unwrap()
  }
}

/// Records every delivered message and counts teardowns.
pub struct Recorder {
  pub log: Arc<Recording>,
}

impl Behavior for Recorder {
  fn handle(&mut self, port: i32, payload: Vec<Value>) -> Result<(), ApiaryError> {
    self.log.deliveries.lock().unwrap().push((port, payload));
    Ok(())
  }

  fn teardown(&mut self) {
    *self.log.teardowns.lock().unwrap() += 1;
  }
}
